// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Routes inbound messages and callbacks to the gate and the orchestrator.
//!
//! The dispatcher is the only place that talks to the transport on behalf of
//! a request. Anything that escapes a handler is logged and answered with a
//! generic error message; it never propagates further.

use crate::error::{Denial, Result};
use crate::gate::{AdmissionGate, AuthorizeRequest, AuthorizeResult};
use crate::messages;
use crate::metrics::Metrics;
use crate::orchestrator::DownloadOrchestrator;
use crate::transport::{ChatId, MessageRef, Transport};
use crate::validator::extract_links;
use crate::verification::VerificationTracker;
use crate::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An event from the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Message {
        user_id: UserId,
        chat_id: ChatId,
        #[serde(default)]
        display_name: Option<String>,
        text: String,
    },
    Callback {
        user_id: UserId,
        chat_id: ChatId,
        callback_id: String,
        /// Message the button was attached to
        message: MessageRef,
        data: String,
    },
}

impl Inbound {
    pub fn user_id(&self) -> UserId {
        match self {
            Self::Message { user_id, .. } | Self::Callback { user_id, .. } => *user_id,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::Message { chat_id, .. } | Self::Callback { chat_id, .. } => *chat_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
    Verify,
}

impl Command {
    /// Parse `/name` or `/name@bot`, ignoring arguments.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "status" => Some(Self::Status),
            "verify" => Some(Self::Verify),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    verification: Arc<VerificationTracker>,
    gate: Arc<AdmissionGate>,
    orchestrator: Arc<DownloadOrchestrator>,
    transport: Arc<dyn Transport>,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn new(
        verification: Arc<VerificationTracker>,
        gate: Arc<AdmissionGate>,
        orchestrator: Arc<DownloadOrchestrator>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            verification,
            gate,
            orchestrator,
            transport,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Handle one inbound event to completion.
    ///
    /// Routing runs on its own task, so an error or a panic in a
    /// collaborator ends here. Either is logged and the user gets a generic
    /// error message.
    pub async fn handle(self: &Arc<Self>, inbound: Inbound) {
        let user_id = inbound.user_id();
        let chat_id = inbound.chat_id();

        let dispatcher = Arc::clone(self);
        match tokio::spawn(async move { dispatcher.route(inbound).await }).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => {
                error!(user_id, chat_id, code = e.code(), error = %e, "Request failed");
            }
            Err(e) => {
                error!(user_id, chat_id, code = "INTERNAL_ERROR", error = %e, "Request handler panicked");
            }
        }

        if let Err(e) = self
            .transport
            .send_text(chat_id, messages::internal_error(), None)
            .await
        {
            warn!(chat_id, error = %e, "Could not report failure to user");
        }
    }

    async fn route(&self, inbound: Inbound) -> Result<()> {
        match inbound {
            Inbound::Message {
                user_id,
                chat_id,
                display_name,
                text,
            } => {
                let display_name = display_name.unwrap_or_else(|| "there".to_string());
                match Command::parse(&text) {
                    Some(Command::Start) => self.start(chat_id, &display_name).await,
                    Some(Command::Help) => self.help(chat_id).await,
                    Some(Command::Status) => self.status(user_id, chat_id).await,
                    Some(Command::Verify) => self.verify(user_id, chat_id, &display_name).await,
                    None => self.links(user_id, chat_id, &text).await,
                }
            }
            Inbound::Callback {
                user_id,
                chat_id,
                callback_id,
                message,
                data,
            } => {
                if data == messages::CHECK_MEMBERSHIP {
                    self.check_membership(user_id, chat_id, &callback_id, message)
                        .await
                } else {
                    debug!(user_id, data = %data, "Unknown callback");
                    self.transport
                        .answer_callback(&callback_id, "Unknown action")
                        .await?;
                    Ok(())
                }
            }
        }
    }

    async fn start(&self, chat_id: ChatId, display_name: &str) -> Result<()> {
        self.transport
            .send_text(chat_id, &messages::welcome(display_name), None)
            .await?;
        self.send_join_prompt(chat_id).await
    }

    async fn help(&self, chat_id: ChatId) -> Result<()> {
        self.transport
            .send_text(chat_id, messages::help(), None)
            .await?;
        Ok(())
    }

    /// Report membership without recording an attempt.
    async fn status(&self, user_id: UserId, chat_id: ChatId) -> Result<()> {
        let outcome = self.verification.query_membership(user_id).await;
        let report = messages::membership_report("Your Membership Status:", &outcome);
        self.transport.send_text(chat_id, &report, None).await?;
        if !outcome.all_required_satisfied {
            self.send_join_prompt(chat_id).await?;
        }
        Ok(())
    }

    async fn verify(&self, user_id: UserId, chat_id: ChatId, display_name: &str) -> Result<()> {
        let remaining = self.verification.remaining_cooldown(user_id).await;
        if !remaining.is_zero() {
            self.transport
                .send_text(chat_id, &messages::cooldown(remaining), None)
                .await?;
            return Ok(());
        }

        let progress = self
            .transport
            .send_text(chat_id, messages::verifying(), None)
            .await?;

        let outcome = match self.verification.try_verify(user_id).await {
            Ok(outcome) => outcome,
            Err(denial) => {
                self.transport
                    .edit_text(progress, &messages::denial(&denial))
                    .await?;
                return Ok(());
            }
        };

        let heading = format!("Verification Results for {display_name}:");
        self.transport
            .edit_text(progress, &messages::membership_report(&heading, &outcome))
            .await?;
        if !outcome.all_required_satisfied {
            self.send_join_prompt(chat_id).await?;
        }
        Ok(())
    }

    async fn check_membership(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        callback_id: &str,
        message: MessageRef,
    ) -> Result<()> {
        let remaining = self.verification.remaining_cooldown(user_id).await;
        if !remaining.is_zero() {
            self.transport
                .answer_callback(callback_id, &messages::cooldown(remaining))
                .await?;
            return Ok(());
        }

        self.transport
            .answer_callback(callback_id, "Verifying your memberships...")
            .await?;

        match self.verification.try_verify(user_id).await {
            Ok(outcome) if outcome.all_required_satisfied => {
                self.transport
                    .edit_text(
                        message,
                        "All required channels verified! You can now send share links.",
                    )
                    .await?;
            }
            Ok(_) => {
                self.transport
                    .edit_text(
                        message,
                        "Not all required channels verified. Please join all channels and try again.",
                    )
                    .await?;
                self.send_join_prompt(chat_id).await?;
            }
            Err(denial) => {
                self.transport
                    .edit_text(message, &messages::denial(&denial))
                    .await?;
            }
        }
        Ok(())
    }

    async fn links(&self, user_id: UserId, chat_id: ChatId, text: &str) -> Result<()> {
        let links = extract_links(text);
        if links.is_empty() {
            debug!(user_id, "Ignoring message without links");
            return Ok(());
        }

        match self.gate.authorize(AuthorizeRequest { user_id }).await {
            AuthorizeResult::Denied(denial) => {
                info!(user_id, code = denial.code(), "Request denied");
                self.record_admission(Some(&denial));
                self.transport
                    .send_text(chat_id, &messages::denial(&denial), None)
                    .await?;
                if denial == Denial::NotAMember {
                    self.send_join_prompt(chat_id).await?;
                }
                return Ok(());
            }
            AuthorizeResult::Allowed { remaining } => {
                debug!(user_id, remaining, links = links.len(), "Request admitted");
                self.record_admission(None);
            }
        }

        let progress = self
            .transport
            .send_text(chat_id, &messages::processing(links.len()), None)
            .await?;

        let summary = self.orchestrator.process_links(chat_id, &links).await;
        if let Some(metrics) = &self.metrics {
            for outcome in &summary.outcomes {
                metrics.record_link(match &outcome.result {
                    Ok(_) => "delivered",
                    Err(e) => e.code(),
                });
            }
        }
        info!(
            user_id,
            delivered = summary.delivered(),
            failed = summary.failed(),
            "Request processed"
        );

        self.transport
            .edit_text(progress, &messages::summary(&summary))
            .await?;
        Ok(())
    }

    async fn send_join_prompt(&self, chat_id: ChatId) -> Result<()> {
        let keyboard = messages::join_keyboard(self.verification.channels());
        self.transport
            .send_text(chat_id, messages::join_prompt(), Some(&keyboard))
            .await?;
        Ok(())
    }

    fn record_admission(&self, denial: Option<&Denial>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_admission(denial.map_or("allowed", Denial::code));
        }
    }
}
