// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the gated relay.

use std::time::Duration;
use thiserror::Error;

/// Why the admission gate refused a request. Terminal for the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("Not a member of every required channel")]
    NotAMember,

    #[error("Verification cooldown active, retry in {}s", remaining.as_secs())]
    Cooldown { remaining: Duration },

    #[error("Rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
}

/// Failure of a single link inside a request. Siblings keep going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid link: {0}")]
    LinkInvalid(String),

    #[error("Could not resolve link: {0}")]
    ResolveFailed(String),

    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Download failed: {0}")]
    FetchFailed(String),

    #[error("Delivery failed: {0}")]
    DispatchFailed(String),
}

/// Failure reported by an external collaborator (transport, provider, membership lookup).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Collaborator timed out")]
    Timeout,

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator rejected the request: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application error types
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Denied(#[from] Denial),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Transport error: {0}")]
    Transport(#[source] CollaboratorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Denial {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAMember => "NOT_A_MEMBER",
            Self::Cooldown { .. } => "COOLDOWN",
            Self::RateLimited { .. } => "RATE_LIMITED",
        }
    }

    /// Wait before the same request could succeed, when one is known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::NotAMember => None,
            Self::Cooldown { remaining } => Some(*remaining),
            Self::RateLimited { retry_after } => Some(*retry_after),
        }
    }
}

impl JobError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::LinkInvalid(_) => "LINK_INVALID",
            Self::ResolveFailed(_) => "RESOLVE_FAILED",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::FetchFailed(_) => "FETCH_FAILED",
            Self::DispatchFailed(_) => "DISPATCH_FAILED",
        }
    }
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Denied(d) => d.code(),
            Self::Job(j) => j.code(),
            Self::Transport(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<CollaboratorError> for RelayError {
    fn from(err: CollaboratorError) -> Self {
        RelayError::Transport(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;
