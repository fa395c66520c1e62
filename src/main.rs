// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Gated Relay Service
//!
//! Relays content from share links to users who have joined every required
//! channel:
//!
//! - Membership verification with attempt limiting and cooldown
//! - 5 requests per 60s per user (default)
//! - 3 concurrent downloads across all users (default)
//! - Size/type based delivery routing
//! - Periodic re-validation, limiter GC and temp storage GC
//!
//! ## Configuration
//!
//! Configuration is loaded from the environment (a `.env` file is honoured):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:3000)
//! - `CHANNELS`: `id|name|invite[|optional];...`, or `CHANNEL_1_ID`,
//!   `CHANNEL_1_NAME`, `CHANNEL_1_INVITE_LINK`, `CHANNEL_1_REQUIRED`, ...
//! - `VERIFY_MAX_ATTEMPTS`, `VERIFY_COOLDOWN_MS`, `VERIFY_CHECK_INTERVAL_MS`
//! - `RATE_MAX_REQUESTS`, `RATE_WINDOW_MS`
//! - `CONCURRENT_DOWNLOADS`, `DOWNLOAD_TIMEOUT_MS`, `RETRY_ATTEMPTS`, `RETRY_DELAY_MS`
//! - `MAX_FILE_SIZE`, `MAX_PHOTO_SIZE`, `MAX_VIDEO_SIZE`, `MAX_DOCUMENT_SIZE`:
//!   delivery ceilings in bytes (default: 2000 MiB, photos 10 MiB). Videos and
//!   photos above their ceiling are sent as documents
//! - `TEMP_DIR`, `TEMP_CLEANUP_INTERVAL_MS`, `TEMP_RETENTION_MS`
//! - `LOOPBACK_MEMBERS`: comma-separated user ids treated as members of every
//!   channel when running on the loopback collaborators
//!
//! Without a live platform bridge the service runs against the in-process
//! collaborators in [`gated_relay::loopback`].

use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gated_relay::{
    http::{router, AppState},
    loopback::{LogTransport, SimulatedProvider, StaticMembership},
    metrics::Metrics,
    AdmissionGate, Config, Dispatcher, DownloadOrchestrator, RateLimiter, Sweepers,
    VerificationTracker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;
    info!(
        bind_addr = %config.bind_addr,
        channels = config.channels.len(),
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window_ms,
        concurrent_downloads = config.download.concurrent_downloads,
        temp_dir = %config.storage.temp_dir.display(),
        "Starting gated relay"
    );

    tokio::fs::create_dir_all(&config.storage.temp_dir).await?;

    let transport = Arc::new(LogTransport::new());
    let membership = Arc::new(loopback_membership(&config).await);
    let provider = Arc::new(SimulatedProvider::default());
    let metrics = Arc::new(Metrics::new()?);

    let verification = Arc::new(VerificationTracker::new(
        config.verification.clone(),
        config.channels.clone(),
        membership,
    ));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let gate = Arc::new(AdmissionGate::new(verification.clone(), limiter.clone()));
    let orchestrator = Arc::new(DownloadOrchestrator::new(
        &config,
        provider,
        transport.clone(),
    ));
    let dispatcher = Arc::new(
        Dispatcher::new(verification.clone(), gate, orchestrator, transport)
            .with_metrics(metrics.clone()),
    );

    let sweepers = Sweepers::start(&config, verification, limiter, Some(metrics.clone()));

    let state = Arc::new(AppState {
        dispatcher,
        metrics,
        config: config.clone(),
        started_at: Utc::now(),
    });
    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweepers.stop().await;
    info!("Shut down");
    Ok(())
}

/// Membership table for the loopback wiring, seeded from `LOOPBACK_MEMBERS`.
async fn loopback_membership(config: &Config) -> StaticMembership {
    let Ok(members) = std::env::var("LOOPBACK_MEMBERS") else {
        warn!("LOOPBACK_MEMBERS not set, membership gating is disabled");
        return StaticMembership::allow_all();
    };

    let user_ids: Vec<i64> = members
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .filter_map(|entry| match entry.parse() {
            Ok(user_id) => Some(user_id),
            Err(e) => {
                warn!(entry, error = %e, "Skipping loopback member");
                None
            }
        })
        .collect();
    info!(members = user_ids.len(), "Loopback membership table seeded");
    StaticMembership::seeded(user_ids, &config.channels).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
