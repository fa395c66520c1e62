// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Gated Relay
//!
//! Admission control and download orchestration for an invite-gated file
//! relay bot:
//!
//! - Membership verification against required channels, with attempt
//!   limiting and cooldown
//! - Per-user sliding-window rate limiting
//! - Bounded-concurrency fetch-then-deliver jobs with guaranteed temp cleanup
//! - Size/type based delivery routing (oversized media falls back to documents)
//! - Background sweepers for re-validation, limiter GC and temp storage GC
//!
//! The messaging platform, the content host and the membership lookup are
//! collaborators behind the [`transport::Transport`],
//! [`provider::ContentProvider`] and [`membership::MembershipProvider`] traits.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod http;
pub mod limiter;
pub mod loopback;
pub mod membership;
pub mod messages;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod sweeper;
pub mod transport;
pub mod validator;
pub mod verification;

/// Platform user identifier.
pub type UserId = i64;

pub use config::Config;
pub use dispatcher::{Dispatcher, Inbound};
pub use error::{CollaboratorError, Denial, JobError, RelayError, Result};
pub use gate::{AdmissionGate, AuthorizeRequest, AuthorizeResult};
pub use limiter::{RateLimitResult, RateLimiter};
pub use orchestrator::{Delivered, DownloadOrchestrator, JobSummary, LinkOutcome};
pub use sweeper::Sweepers;
pub use validator::LinkValidator;
pub use verification::{VerificationOutcome, VerificationTracker};
