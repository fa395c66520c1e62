// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Content-host link extraction and validation.
//!
//! Links are pulled out of free text loosely, then each one is validated
//! before anything is sent to the content provider:
//! - http/https scheme with a host
//! - host's registrable domain on the allow-list
//! - a non-empty share path

use crate::config::LinkConfig;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Malformed URL: {0}")]
    Malformed(String),

    #[error("Unsupported scheme in {url}")]
    UnsupportedScheme { url: String },

    #[error("Host {host} is not a supported content host")]
    UnknownHost { host: String },

    #[error("Link has no share path: {url}")]
    MissingSharePath { url: String },
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)https?://[^\s<>]+").expect("link pattern is valid")
    })
}

/// Every http(s) URL in `text`, in order of appearance.
pub fn extract_links(text: &str) -> Vec<String> {
    link_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', ';']).to_string())
        .collect()
}

/// Content-host link validator.
#[derive(Debug, Clone)]
pub struct LinkValidator {
    allowed: Vec<String>,
}

impl LinkValidator {
    /// Create a new validator with the given configuration.
    pub fn new(config: LinkConfig) -> Self {
        Self {
            allowed: config
                .allowed_hosts
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
        }
    }

    /// Validate one link, returning the parsed URL.
    pub fn validate(&self, link: &str) -> Result<Url, LinkError> {
        let url = Url::parse(link.trim()).map_err(|_| {
            debug!(link = %link, "Malformed link");
            LinkError::Malformed(link.to_string())
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            debug!(link = %link, "Unsupported link scheme");
            return Err(LinkError::UnsupportedScheme {
                url: link.to_string(),
            });
        }

        let host = url
            .host_str()
            .ok_or_else(|| LinkError::Malformed(link.to_string()))?;
        let domain = extract_registrable_domain(host);
        if !self.allowed.iter().any(|a| *a == domain) {
            debug!(host = %host, domain = %domain, "Link host not allowed");
            return Err(LinkError::UnknownHost {
                host: host.to_string(),
            });
        }

        if url.path().trim_matches('/').is_empty() {
            return Err(LinkError::MissingSharePath {
                url: link.to_string(),
            });
        }

        Ok(url)
    }
}

/// Extract the registrable domain from a hostname.
/// This is a simplified implementation; a production version would use
/// the Public Suffix List.
fn extract_registrable_domain(host: &str) -> String {
    let host = host.to_lowercase();

    // Handle IP addresses
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() <= 2 {
        return host;
    }

    let last_two = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
    if is_two_part_tld(&last_two) {
        // e.g., "share.example.co.uk" -> "example.co.uk"
        format!("{}.{}", parts[parts.len() - 3], last_two)
    } else {
        // e.g., "www.terabox.com" -> "terabox.com"
        last_two
    }
}

/// Check if a suffix is a known two-part TLD.
fn is_two_part_tld(suffix: &str) -> bool {
    const TWO_PART_TLDS: &[&str] = &[
        "co.uk", "org.uk", "me.uk", "co.nz", "co.jp", "co.kr", "com.au", "net.au", "org.au",
        "com.br", "co.za",
    ];
    TWO_PART_TLDS.contains(&suffix)
}
