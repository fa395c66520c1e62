// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Sliding-window rate limiter.
//!
//! Each user keeps the timestamps of their admitted requests. A request is
//! allowed while fewer than `max_requests` timestamps fall strictly inside the
//! last `window`, so bursts that straddle a bucket boundary are still caught.

use crate::config::RateLimitConfig;
use crate::UserId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in current window
        remaining: u32,
    },
    /// Request is rate limited
    Limited {
        /// Time until the oldest counted request leaves the window
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Request timestamps of one user, oldest first.
#[derive(Debug, Default)]
struct RateWindow {
    hits: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, keep: Duration) {
        while let Some(oldest) = self.hits.front() {
            if now.duration_since(*oldest) < keep {
                break;
            }
            self.hits.pop_front();
        }
    }

    fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.hits
            .iter()
            .filter(|t| now.duration_since(**t) < window)
            .count()
    }

    fn retry_after(&self, now: Instant, window: Duration) -> Duration {
        self.hits
            .iter()
            .find(|t| now.duration_since(**t) < window)
            .map(|oldest| (*oldest + window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}

/// Thread-safe rate limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: RwLock<HashMap<UserId, RateWindow>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Read-only probe: would another request be refused right now?
    pub async fn is_limited(&self, user_id: UserId) -> bool {
        !self.check(user_id).await.is_allowed()
    }

    /// Read-only probe with remaining allowance or wait time.
    pub async fn check(&self, user_id: UserId) -> RateLimitResult {
        let window = self.config.window_duration();
        let now = Instant::now();
        let windows = self.windows.read().await;
        match windows.get(&user_id) {
            Some(w) => self.evaluate(w, now, window),
            None => RateLimitResult::Allowed {
                remaining: self.config.max_requests,
            },
        }
    }

    /// Charge a request to the user.
    pub async fn record_request(&self, user_id: UserId) {
        let window = self.config.window_duration();
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let w = windows.entry(user_id).or_default();
        w.hits.push_back(now);
        w.prune(now, window);
    }

    /// Check and charge under one lock so concurrent requests cannot both
    /// squeeze into the last free slot.
    pub async fn try_acquire(&self, user_id: UserId) -> RateLimitResult {
        let window = self.config.window_duration();
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let w = windows.entry(user_id).or_default();
        w.prune(now, window);

        match self.evaluate(w, now, window) {
            RateLimitResult::Allowed { remaining } => {
                w.hits.push_back(now);
                RateLimitResult::Allowed {
                    remaining: remaining.saturating_sub(1),
                }
            }
            limited => {
                debug!(user_id, ?limited, "User rate limited");
                limited
            }
        }
    }

    fn evaluate(&self, w: &RateWindow, now: Instant, window: Duration) -> RateLimitResult {
        let used = w.count_within(now, window);
        let max = self.config.max_requests as usize;
        if used < max {
            RateLimitResult::Allowed {
                remaining: (max - used) as u32,
            }
        } else {
            RateLimitResult::Limited {
                retry_after: w.retry_after(now, window),
            }
        }
    }

    /// Drop history older than two windows and forget users with none left.
    ///
    /// Returns the number of users removed.
    pub async fn sweep(&self) -> usize {
        let keep = self.config.sweep_interval();
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| {
            w.prune(now, keep);
            !w.hits.is_empty()
        });
        let removed = before - windows.len();
        debug!(removed, tracked = windows.len(), "Rate limiter sweep");
        removed
    }

    /// Number of users with history.
    pub async fn tracked_users(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_ms: window_secs * 1000,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_rate_limiting() {
        let limiter = limiter(5, 60);

        // First 5 requests should succeed
        for _ in 0..5 {
            assert!(!limiter.is_limited(1).await, "Should not be limited");
            limiter.record_request(1).await;
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        // 6th request should be limited
        assert!(limiter.is_limited(1).await, "Should be limited");
        match limiter.check(1).await {
            RateLimitResult::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(55));
            }
            RateLimitResult::Allowed { .. } => panic!("Should be limited"),
        }

        // a full window after the first request frees one slot
        tokio::time::advance(Duration::from_secs(55)).await;
        assert!(!limiter.is_limited(1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_does_not_charge() {
        let limiter = limiter(1, 60);
        for _ in 0..10 {
            assert!(!limiter.is_limited(2).await);
        }
        assert!(limiter.try_acquire(2).await.is_allowed());
        assert!(!limiter.try_acquire(2).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_across_boundary() {
        let limiter = limiter(3, 10);

        tokio::time::advance(Duration::from_secs(8)).await;
        for _ in 0..3 {
            assert!(limiter.try_acquire(4).await.is_allowed());
        }
        // a fixed 10s bucket would reset here
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!limiter.try_acquire(4).await.is_allowed());

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(
            limiter.try_acquire(4).await,
            RateLimitResult::Allowed { remaining: 2 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_are_independent() {
        let limiter = limiter(2, 60);
        for _ in 0..2 {
            assert!(limiter.try_acquire(10).await.is_allowed());
        }
        assert!(!limiter.try_acquire(10).await.is_allowed());
        assert!(limiter.try_acquire(11).await.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_young_history() {
        let limiter = limiter(5, 10);
        limiter.record_request(1).await;
        tokio::time::advance(Duration::from_secs(15)).await;
        limiter.record_request(2).await;

        // user 1 is 15s old: outside the window but inside 2x window
        assert_eq!(limiter.sweep().await, 0);
        assert_eq!(limiter.tracked_users().await, 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.sweep().await, 1);
        assert_eq!(limiter.tracked_users().await, 1);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(limiter.sweep().await, 1);
        assert_eq!(limiter.tracked_users().await, 0);
    }
}
