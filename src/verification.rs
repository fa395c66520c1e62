// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Membership verification state machine.
//!
//! Each user moves between unverified and verified. Failed checks are counted
//! and, once `max_attempts` is reached, a cooldown blocks further manual
//! checks until it expires. Cooldowns are evaluated against the clock at call
//! time; nothing runs on a timer.

use crate::config::{ChannelRequirement, VerificationConfig};
use crate::error::Denial;
use crate::membership::MembershipProvider;
use crate::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Per-user verification state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationRecord {
    pub verified: bool,
    pub failed_attempts: u32,
    pub cooldown_until: Option<Instant>,
}

/// Membership of one configured channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub channel_id: String,
    pub display_name: String,
    pub required: bool,
    pub joined: bool,
}

/// Result of a membership query, in channel display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub per_channel: Vec<ChannelStatus>,
    pub all_required_satisfied: bool,
}

impl VerificationOutcome {
    fn from_statuses(per_channel: Vec<ChannelStatus>) -> Self {
        let all_required_satisfied = per_channel.iter().filter(|c| c.required).all(|c| c.joined);
        Self {
            per_channel,
            all_required_satisfied,
        }
    }

    /// Whether the user joined `channel_id`; `None` for unknown channels.
    pub fn is_joined(&self, channel_id: &str) -> Option<bool> {
        self.per_channel
            .iter()
            .find(|c| c.channel_id == channel_id)
            .map(|c| c.joined)
    }
}

/// Owns every user's [`VerificationRecord`].
pub struct VerificationTracker {
    config: VerificationConfig,
    channels: Vec<ChannelRequirement>,
    membership: Arc<dyn MembershipProvider>,
    records: RwLock<HashMap<UserId, VerificationRecord>>,
}

impl VerificationTracker {
    pub fn new(
        config: VerificationConfig,
        channels: Vec<ChannelRequirement>,
        membership: Arc<dyn MembershipProvider>,
    ) -> Self {
        Self {
            config,
            channels,
            membership,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn channels(&self) -> &[ChannelRequirement] {
        &self.channels
    }

    /// Ask the collaborator about every configured channel.
    ///
    /// A failed lookup counts as "not joined". No state is touched.
    pub async fn query_membership(&self, user_id: UserId) -> VerificationOutcome {
        let mut per_channel = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let joined = match self.membership.membership_status(user_id, &channel.id).await {
                Ok(status) => status.is_joined(),
                Err(e) => {
                    warn!(user_id, channel = %channel.id, error = %e, "Membership lookup failed");
                    false
                }
            };
            per_channel.push(ChannelStatus {
                channel_id: channel.id.clone(),
                display_name: channel.display_name.clone(),
                required: channel.required,
                joined,
            });
        }
        VerificationOutcome::from_statuses(per_channel)
    }

    /// Query membership and record the result as a verification attempt.
    pub async fn verify(&self, user_id: UserId) -> VerificationOutcome {
        let outcome = self.query_membership(user_id).await;

        let mut records = self.records.write().await;
        let record = records.entry(user_id).or_default();
        if outcome.all_required_satisfied {
            *record = VerificationRecord {
                verified: true,
                failed_attempts: 0,
                cooldown_until: None,
            };
            info!(user_id, "User verified");
        } else {
            record.verified = false;
            record.failed_attempts += 1;
            if record.failed_attempts >= self.config.max_attempts {
                record.cooldown_until = Some(Instant::now() + self.config.cooldown_duration());
                warn!(
                    user_id,
                    attempts = record.failed_attempts,
                    cooldown_ms = self.config.cooldown_ms,
                    "Verification attempts exhausted, applying cooldown"
                );
            } else {
                debug!(user_id, attempts = record.failed_attempts, "Verification failed");
            }
        }

        outcome
    }

    /// [`verify`](Self::verify), refused up front while a cooldown is active.
    pub async fn try_verify(&self, user_id: UserId) -> Result<VerificationOutcome, Denial> {
        let remaining = self.remaining_cooldown(user_id).await;
        if !remaining.is_zero() {
            debug!(user_id, ?remaining, "Verification refused during cooldown");
            return Err(Denial::Cooldown { remaining });
        }
        Ok(self.verify(user_id).await)
    }

    pub async fn is_in_cooldown(&self, user_id: UserId) -> bool {
        !self.remaining_cooldown(user_id).await.is_zero()
    }

    /// Time left in the cooldown, zero when none is active.
    pub async fn remaining_cooldown(&self, user_id: UserId) -> Duration {
        let records = self.records.read().await;
        records
            .get(&user_id)
            .and_then(|r| r.cooldown_until)
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Cached state only; never queries membership.
    pub async fn is_verified(&self, user_id: UserId) -> bool {
        self.records
            .read()
            .await
            .get(&user_id)
            .is_some_and(|r| r.verified)
    }

    /// Re-check a user without counting an attempt.
    ///
    /// Returns whether the user still satisfies every required channel. A
    /// verified user who no longer does is demoted; no cooldown is applied.
    pub async fn revalidate(&self, user_id: UserId) -> bool {
        let outcome = self.query_membership(user_id).await;
        if outcome.all_required_satisfied {
            return true;
        }

        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&user_id) {
            if record.verified {
                record.verified = false;
                info!(user_id, "Demoted user who left a required channel");
            }
        }
        false
    }

    pub async fn verified_users(&self) -> Vec<UserId> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(_, r)| r.verified)
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn record(&self, user_id: UserId) -> Option<VerificationRecord> {
        self.records.read().await.get(&user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::StaticMembership;

    fn channels() -> Vec<ChannelRequirement> {
        vec![
            ChannelRequirement {
                id: "main".into(),
                display_name: "Main".into(),
                invite_link: "https://t.me/+main".into(),
                required: true,
            },
            ChannelRequirement {
                id: "lounge".into(),
                display_name: "Lounge".into(),
                invite_link: "https://t.me/+lounge".into(),
                required: false,
            },
        ]
    }

    fn tracker(membership: Arc<StaticMembership>) -> VerificationTracker {
        VerificationTracker::new(
            VerificationConfig {
                max_attempts: 3,
                cooldown_ms: 60_000,
                ..Default::default()
            },
            channels(),
            membership,
        )
    }

    #[tokio::test]
    async fn test_verify_success_with_optional_missing() {
        let membership = Arc::new(StaticMembership::new());
        membership.join(7, "main").await;
        let tracker = tracker(membership);

        let outcome = tracker.verify(7).await;
        assert!(outcome.all_required_satisfied);
        assert_eq!(outcome.is_joined("lounge"), Some(false));
        assert!(tracker.is_verified(7).await);
        assert_eq!(tracker.record(7).await.unwrap().failed_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_after_max_attempts() {
        let tracker = tracker(Arc::new(StaticMembership::new()));

        for _ in 0..2 {
            tracker.verify(1).await;
            assert!(!tracker.is_in_cooldown(1).await);
        }
        tracker.verify(1).await;
        assert!(tracker.is_in_cooldown(1).await);

        let remaining = tracker.remaining_cooldown(1).await;
        assert!(remaining > Duration::ZERO && remaining <= Duration::from_secs(60));
        assert!(matches!(
            tracker.try_verify(1).await,
            Err(Denial::Cooldown { .. })
        ));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!tracker.is_in_cooldown(1).await);
        assert_eq!(tracker.remaining_cooldown(1).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_attempts_and_cooldown() {
        let membership = Arc::new(StaticMembership::new());
        let tracker = tracker(membership.clone());

        for _ in 0..3 {
            tracker.verify(5).await;
        }
        assert!(tracker.is_in_cooldown(5).await);

        membership.join(5, "main").await;
        let outcome = tracker.verify(5).await;
        assert!(outcome.all_required_satisfied);

        let record = tracker.record(5).await.unwrap();
        assert_eq!(record.failed_attempts, 0);
        assert_eq!(record.cooldown_until, None);
        assert!(!tracker.is_in_cooldown(5).await);
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_closed() {
        let membership = Arc::new(StaticMembership::new());
        membership.join(3, "main").await;
        membership.fail_channel("main").await;
        let tracker = tracker(membership);

        let outcome = tracker.query_membership(3).await;
        assert_eq!(outcome.is_joined("main"), Some(false));
        assert!(!outcome.all_required_satisfied);
        // query alone records nothing
        assert_eq!(tracker.record(3).await, None);
    }

    #[tokio::test]
    async fn test_revalidate_demotes_without_cooldown() {
        let membership = Arc::new(StaticMembership::new());
        membership.join(9, "main").await;
        let tracker = tracker(membership.clone());
        tracker.verify(9).await;

        assert!(tracker.revalidate(9).await);
        assert!(tracker.is_verified(9).await);

        membership.leave(9, "main").await;
        assert!(!tracker.revalidate(9).await);

        let record = tracker.record(9).await.unwrap();
        assert!(!record.verified);
        assert_eq!(record.failed_attempts, 0);
        assert_eq!(record.cooldown_until, None);
        assert!(tracker.verified_users().await.is_empty());
    }
}
