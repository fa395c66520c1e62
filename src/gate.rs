// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Admission gate: membership first, then rate.

use crate::error::Denial;
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::verification::VerificationTracker;
use crate::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Admission check request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub user_id: UserId,
}

/// Outcome of [`AdmissionGate::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeResult {
    Allowed {
        /// Requests left in the current window
        remaining: u32,
    },
    Denied(Denial),
}

impl AuthorizeResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

pub struct AdmissionGate {
    verification: Arc<VerificationTracker>,
    limiter: Arc<RateLimiter>,
}

impl AdmissionGate {
    pub fn new(verification: Arc<VerificationTracker>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            verification,
            limiter,
        }
    }

    /// Decide whether a request may dispatch work.
    ///
    /// Unverified users get one on-demand verification (refused while in
    /// cooldown). The rate window is charged only when the request is allowed.
    pub async fn authorize(&self, request: AuthorizeRequest) -> AuthorizeResult {
        let user_id = request.user_id;

        if !self.verification.is_verified(user_id).await {
            match self.verification.try_verify(user_id).await {
                Ok(outcome) if outcome.all_required_satisfied => {}
                Ok(_) => {
                    debug!(user_id, "Denied: not a member");
                    return AuthorizeResult::Denied(Denial::NotAMember);
                }
                Err(denial) => return AuthorizeResult::Denied(denial),
            }
        }

        match self.limiter.try_acquire(user_id).await {
            RateLimitResult::Allowed { remaining } => AuthorizeResult::Allowed { remaining },
            RateLimitResult::Limited { retry_after } => {
                AuthorizeResult::Denied(Denial::RateLimited { retry_after })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelRequirement, RateLimitConfig, VerificationConfig};
    use crate::loopback::StaticMembership;

    fn gate(membership: Arc<StaticMembership>, max_requests: u32) -> (AdmissionGate, Arc<RateLimiter>) {
        let channels = vec![ChannelRequirement {
            id: "main".into(),
            display_name: "Main".into(),
            invite_link: "https://t.me/+main".into(),
            required: true,
        }];
        let verification = Arc::new(VerificationTracker::new(
            VerificationConfig {
                max_attempts: 2,
                ..Default::default()
            },
            channels,
            membership,
        ));
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests,
            window_ms: 60_000,
        }));
        (AdmissionGate::new(verification, limiter.clone()), limiter)
    }

    #[tokio::test]
    async fn test_non_member_denied_without_charge() {
        let (gate, limiter) = gate(Arc::new(StaticMembership::new()), 5);

        let result = gate.authorize(AuthorizeRequest { user_id: 1 }).await;
        assert_eq!(result, AuthorizeResult::Denied(Denial::NotAMember));
        assert_eq!(limiter.tracked_users().await, 0);
    }

    #[tokio::test]
    async fn test_repeated_failures_turn_into_cooldown() {
        let (gate, _) = gate(Arc::new(StaticMembership::new()), 5);
        let request = AuthorizeRequest { user_id: 1 };

        gate.authorize(request).await;
        gate.authorize(request).await;
        assert!(matches!(
            gate.authorize(request).await,
            AuthorizeResult::Denied(Denial::Cooldown { .. })
        ));
    }

    #[tokio::test]
    async fn test_member_allowed_until_rate_limited() {
        let membership = Arc::new(StaticMembership::new());
        membership.join(2, "main").await;
        let (gate, _) = gate(membership, 2);
        let request = AuthorizeRequest { user_id: 2 };

        assert_eq!(
            gate.authorize(request).await,
            AuthorizeResult::Allowed { remaining: 1 }
        );
        assert!(gate.authorize(request).await.is_allowed());
        assert!(matches!(
            gate.authorize(request).await,
            AuthorizeResult::Denied(Denial::RateLimited { .. })
        ));
    }
}
