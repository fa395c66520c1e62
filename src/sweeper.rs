// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Background sweepers.
//!
//! Three independent periodic tasks:
//! 1. Re-validate verified users and demote those who left a required channel
//! 2. Garbage-collect stale rate-limiter histories
//! 3. Delete temp storage left behind by crashed jobs
//!
//! Each iteration runs on its own task so a failure or panic is logged and the
//! loop carries on. [`Sweepers::stop`] ends all three.

use crate::config::Config;
use crate::limiter::RateLimiter;
use crate::metrics::Metrics;
use crate::verification::VerificationTracker;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Running sweeper tasks.
pub struct Sweepers {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Sweepers {
    pub fn start(
        config: &Config,
        verification: Arc<VerificationTracker>,
        limiter: Arc<RateLimiter>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let (shutdown, stop) = watch::channel(false);
        let temp_root = config.storage.temp_dir.clone();
        let retention = config.storage.retention();

        let handles = vec![
            spawn_periodic(
                "revalidation",
                config.verification.check_interval(),
                stop.clone(),
                metrics.clone(),
                move || {
                    let verification = verification.clone();
                    async move { Ok(revalidate_verified(&verification).await) }
                },
            ),
            spawn_periodic(
                "rate_limiter",
                config.rate_limit.sweep_interval(),
                stop.clone(),
                metrics.clone(),
                move || {
                    let limiter = limiter.clone();
                    async move { Ok(limiter.sweep().await) }
                },
            ),
            spawn_periodic(
                "temp_storage",
                config.storage.cleanup_interval(),
                stop,
                metrics,
                move || {
                    let temp_root = temp_root.clone();
                    async move { sweep_temp_root(&temp_root, retention).await }
                },
            ),
        ];

        info!("Sweepers started");
        Self { shutdown, handles }
    }

    /// Signal every sweeper and wait for them to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweeper ended abnormally");
            }
        }
        info!("Sweepers stopped");
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    metrics: Option<Arc<Metrics>>,
    task: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<usize>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }

            let ok = match tokio::spawn(task()).await {
                Ok(Ok(affected)) => {
                    debug!(sweeper = name, affected, "Sweep finished");
                    true
                }
                Ok(Err(e)) => {
                    warn!(sweeper = name, error = %e, "Sweep failed");
                    false
                }
                Err(e) => {
                    error!(sweeper = name, error = %e, "Sweep panicked");
                    false
                }
            };
            if let Some(metrics) = &metrics {
                metrics.record_sweep(name, ok);
            }
        }
    })
}

/// Re-check every verified user. Returns how many were demoted.
///
/// Each user is checked on its own task; a panic skips that user only.
pub async fn revalidate_verified(verification: &Arc<VerificationTracker>) -> usize {
    let mut demoted = 0;
    for user_id in verification.verified_users().await {
        let tracker = Arc::clone(verification);
        match tokio::spawn(async move { tracker.revalidate(user_id).await }).await {
            Ok(true) => {}
            Ok(false) => demoted += 1,
            Err(e) => error!(user_id, error = %e, "Revalidation panicked"),
        }
    }
    demoted
}

/// Delete entries directly under `root` whose last modification is at least
/// `retention` old. Returns how many were removed.
///
/// A missing root is not an error. A failure on one entry is logged and the
/// sweep moves on.
pub async fn sweep_temp_root(root: &Path, retention: Duration) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat temp entry");
                continue;
            }
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age < retention {
            continue;
        }

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale temp entry");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp entry"),
        }
    }
    Ok(removed)
}
