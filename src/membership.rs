// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Membership lookup collaborator.

use crate::error::CollaboratorError;
use crate::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Membership state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Member,
    Admin,
    Owner,
    None,
    Unknown,
}

impl MembershipStatus {
    /// Members, admins and owners count as joined.
    pub fn is_joined(self) -> bool {
        matches!(self, Self::Member | Self::Admin | Self::Owner)
    }
}

/// Answers "is this user in that channel".
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    async fn membership_status(
        &self,
        user_id: UserId,
        channel_id: &str,
    ) -> Result<MembershipStatus, CollaboratorError>;
}
