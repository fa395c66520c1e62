// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the gated relay.
//!
//! Everything is loaded once at startup and treated as immutable afterwards.
//! [`Config::from_env`] reads the process environment (after an optional
//! `.env` file has been applied by the binary).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const MIB: u64 = 1024 * 1024;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP bind address (default: 0.0.0.0:3000)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Channels a user must join, in display order
    #[serde(default)]
    pub channels: Vec<ChannelRequirement>,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub delivery: DeliveryLimits,

    #[serde(default)]
    pub links: LinkConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// A gated channel or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequirement {
    pub id: String,
    pub display_name: String,
    pub invite_link: String,
    /// Optional channels are shown but never block access
    #[serde(default = "default_true")]
    pub required: bool,
}

/// Membership verification policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Failed checks before a cooldown is applied (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Cooldown length in milliseconds (default: 300000)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Re-validation sweep interval in milliseconds (default: 60000)
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

/// Sliding-window rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per window (default: 5)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds (default: 60000)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

/// Download pool and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Global fetch slots shared by every user (default: 3)
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    /// Upper bound on one fetch attempt, slot wait included (default: 300000)
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,

    /// Retries after the first failed attempt (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff between attempts in milliseconds (default: 5000)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Platform transfer ceilings in bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLimits {
    #[serde(default = "default_platform_max")]
    pub max_file_size: u64,

    #[serde(default = "default_photo_max")]
    pub max_photo_size: u64,

    #[serde(default = "default_platform_max")]
    pub max_video_size: u64,

    #[serde(default = "default_platform_max")]
    pub max_document_size: u64,
}

/// Accepted content-host links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Registrable domains links may point at
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

/// Temporary storage for fetched artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Temp sweep interval in milliseconds (default: 3600000)
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    /// Age after which leftovers are deleted, in milliseconds (default: 3600000)
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

/// Rejected configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no required channel configured")]
    NoRequiredChannel,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("channel {0} is missing an invite link")]
    MissingInvite(String),

    #[error("{0} exceeds delivery.max_file_size")]
    AboveFileLimit(&'static str),
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_cooldown_ms() -> u64 {
    300_000
}

fn default_check_interval_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_concurrent_downloads() -> usize {
    3
}

fn default_download_timeout_ms() -> u64 {
    300_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_platform_max() -> u64 {
    2000 * MIB
}

fn default_photo_max() -> u64 {
    10 * MIB
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["terabox.com".to_string(), "1024tera.com".to_string()]
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("gated_relay_downloads")
}

fn default_cleanup_interval_ms() -> u64 {
    3_600_000
}

fn default_retention_ms() -> u64 {
    3_600_000
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            channels: Vec::new(),
            verification: VerificationConfig::default(),
            rate_limit: RateLimitConfig::default(),
            download: DownloadConfig::default(),
            delivery: DeliveryLimits::default(),
            links: LinkConfig::default(),
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_ms: default_cooldown_ms(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: default_concurrent_downloads(),
            download_timeout_ms: default_download_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for DeliveryLimits {
    fn default() -> Self {
        Self {
            max_file_size: default_platform_max(),
            max_photo_size: default_photo_max(),
            max_video_size: default_platform_max(),
            max_document_size: default_platform_max(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            retention_ms: default_retention_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl VerificationConfig {
    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl RateLimitConfig {
    /// Get the rate window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Histories are kept for two windows and swept at the same period.
    pub fn sweep_interval(&self) -> Duration {
        self.window_duration() * 2
    }
}

impl DownloadConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl StorageConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Channels come from the compact `CHANNELS` list when set, otherwise from
    /// `CHANNEL_<n>_ID`, `CHANNEL_<n>_NAME`, `CHANNEL_<n>_INVITE_LINK` and
    /// `CHANNEL_<n>_REQUIRED`, starting at 1 and stopping at the first missing id.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reading through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let channels = match lookup("CHANNELS") {
            Some(compact) => parse_compact_channels(&compact),
            None => indexed_channels(&lookup),
        };

        Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            channels,
            verification: VerificationConfig {
                max_attempts: parsed(&lookup, "VERIFY_MAX_ATTEMPTS")
                    .unwrap_or(defaults.verification.max_attempts),
                cooldown_ms: parsed(&lookup, "VERIFY_COOLDOWN_MS")
                    .unwrap_or(defaults.verification.cooldown_ms),
                check_interval_ms: parsed(&lookup, "VERIFY_CHECK_INTERVAL_MS")
                    .unwrap_or(defaults.verification.check_interval_ms),
            },
            rate_limit: RateLimitConfig {
                max_requests: parsed(&lookup, "RATE_MAX_REQUESTS")
                    .unwrap_or(defaults.rate_limit.max_requests),
                window_ms: parsed(&lookup, "RATE_WINDOW_MS").unwrap_or(defaults.rate_limit.window_ms),
            },
            download: DownloadConfig {
                concurrent_downloads: parsed(&lookup, "CONCURRENT_DOWNLOADS")
                    .unwrap_or(defaults.download.concurrent_downloads),
                download_timeout_ms: parsed(&lookup, "DOWNLOAD_TIMEOUT_MS")
                    .unwrap_or(defaults.download.download_timeout_ms),
                retry_attempts: parsed(&lookup, "RETRY_ATTEMPTS")
                    .unwrap_or(defaults.download.retry_attempts),
                retry_delay_ms: parsed(&lookup, "RETRY_DELAY_MS")
                    .unwrap_or(defaults.download.retry_delay_ms),
            },
            delivery: DeliveryLimits {
                max_file_size: parsed(&lookup, "MAX_FILE_SIZE")
                    .unwrap_or(defaults.delivery.max_file_size),
                max_photo_size: parsed(&lookup, "MAX_PHOTO_SIZE")
                    .unwrap_or(defaults.delivery.max_photo_size),
                max_video_size: parsed(&lookup, "MAX_VIDEO_SIZE")
                    .unwrap_or(defaults.delivery.max_video_size),
                max_document_size: parsed(&lookup, "MAX_DOCUMENT_SIZE")
                    .unwrap_or(defaults.delivery.max_document_size),
            },
            links: LinkConfig {
                allowed_hosts: lookup("ALLOWED_HOSTS")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.links.allowed_hosts),
            },
            storage: StorageConfig {
                temp_dir: lookup("TEMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.temp_dir),
                cleanup_interval_ms: parsed(&lookup, "TEMP_CLEANUP_INTERVAL_MS")
                    .unwrap_or(defaults.storage.cleanup_interval_ms),
                retention_ms: parsed(&lookup, "TEMP_RETENTION_MS")
                    .unwrap_or(defaults.storage.retention_ms),
            },
            metrics: MetricsConfig {
                enabled: lookup("METRICS_ENABLED")
                    .map(|v| parse_flag(&v))
                    .unwrap_or(defaults.metrics.enabled),
                path: lookup("METRICS_PATH").unwrap_or(defaults.metrics.path),
            },
        }
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.channels.iter().any(|c| c.required) {
            return Err(ConfigError::NoRequiredChannel);
        }
        if let Some(channel) = self.channels.iter().find(|c| c.invite_link.is_empty()) {
            return Err(ConfigError::MissingInvite(channel.id.clone()));
        }
        if self.verification.max_attempts == 0 {
            return Err(ConfigError::Zero("verification.max_attempts"));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Zero("rate_limit.max_requests"));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Zero("rate_limit.window_ms"));
        }
        if self.download.concurrent_downloads == 0 {
            return Err(ConfigError::Zero("download.concurrent_downloads"));
        }
        if self.download.download_timeout_ms == 0 {
            return Err(ConfigError::Zero("download.download_timeout_ms"));
        }
        if self.verification.check_interval_ms == 0 {
            return Err(ConfigError::Zero("verification.check_interval_ms"));
        }
        if self.storage.cleanup_interval_ms == 0 {
            return Err(ConfigError::Zero("storage.cleanup_interval_ms"));
        }

        let limits = &self.delivery;
        if limits.max_file_size == 0 {
            return Err(ConfigError::Zero("delivery.max_file_size"));
        }
        for (name, ceiling) in [
            ("delivery.max_photo_size", limits.max_photo_size),
            ("delivery.max_video_size", limits.max_video_size),
            ("delivery.max_document_size", limits.max_document_size),
        ] {
            if ceiling > limits.max_file_size {
                return Err(ConfigError::AboveFileLimit(name));
            }
        }
        Ok(())
    }
}

/// `CHANNELS=id|name|invite[|optional];...`
fn parse_compact_channels(value: &str) -> Vec<ChannelRequirement> {
    value
        .split(';')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match entry.parse() {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(entry = %entry.trim(), error = %e, "Skipping channel entry");
                None
            }
        })
        .collect()
}

/// `CHANNEL_<n>_*` from 1 up to the first missing id.
fn indexed_channels(lookup: &impl Fn(&str) -> Option<String>) -> Vec<ChannelRequirement> {
    let mut channels = Vec::new();
    for n in 1.. {
        let Some(id) = lookup(&format!("CHANNEL_{n}_ID")) else {
            break;
        };
        channels.push(ChannelRequirement {
            display_name: lookup(&format!("CHANNEL_{n}_NAME"))
                .unwrap_or_else(|| format!("Channel {n}")),
            invite_link: lookup(&format!("CHANNEL_{n}_INVITE_LINK")).unwrap_or_default(),
            required: lookup(&format!("CHANNEL_{n}_REQUIRED"))
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            id,
        });
    }
    channels
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

impl FromStr for ChannelRequirement {
    type Err = ConfigError;

    /// Parse `id|name|invite[|optional]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('|').map(str::trim);
        let id = parts.next().unwrap_or_default().to_string();
        let display_name = parts.next().unwrap_or(&id).to_string();
        let invite_link = parts.next().unwrap_or_default().to_string();
        if invite_link.is_empty() {
            return Err(ConfigError::MissingInvite(id));
        }
        let required = parts.next() != Some("optional");
        Ok(Self {
            id,
            display_name,
            invite_link,
            required,
        })
    }
}
