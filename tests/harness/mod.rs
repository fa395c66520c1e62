// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for end-to-end relay scenarios.
//!
//! Wires the real gate, tracker, limiter and orchestrator to scriptable
//! collaborators and a throwaway temp root.

#![allow(dead_code)]

pub mod fakes;

use fakes::{FakeProvider, RecordingTransport};
use gated_relay::config::{ChannelRequirement, Config};
use gated_relay::loopback::StaticMembership;
use gated_relay::{
    AdmissionGate, Dispatcher, DownloadOrchestrator, Inbound, RateLimiter, VerificationTracker,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const CHAT: i64 = 500;
pub const MAIN_CHANNEL: &str = "@main";
pub const EXTRA_CHANNEL: &str = "@extra";

/// One required and one optional channel, fast retries.
pub fn test_config(temp_root: &Path) -> Config {
    let mut config = Config::default();
    config.channels = vec![
        ChannelRequirement {
            id: MAIN_CHANNEL.into(),
            display_name: "Main".into(),
            invite_link: "https://t.me/+main".into(),
            required: true,
        },
        ChannelRequirement {
            id: EXTRA_CHANNEL.into(),
            display_name: "Extra".into(),
            invite_link: "https://t.me/+extra".into(),
            required: false,
        },
    ];
    config.download.retry_attempts = 1;
    config.download.retry_delay_ms = 100;
    config.download.download_timeout_ms = 10_000;
    config.storage.temp_dir = temp_root.to_path_buf();
    config
}

pub struct Relay {
    pub config: Config,
    pub dispatcher: Arc<Dispatcher>,
    pub orchestrator: Arc<DownloadOrchestrator>,
    pub verification: Arc<VerificationTracker>,
    pub limiter: Arc<RateLimiter>,
    pub gate: Arc<AdmissionGate>,
    pub provider: Arc<FakeProvider>,
    pub transport: Arc<RecordingTransport>,
    pub membership: Arc<StaticMembership>,
    pub temp: TempDir,
}

impl Relay {
    /// Build a relay; `tweak` adjusts the default test config.
    pub fn new(provider: FakeProvider, tweak: impl FnOnce(&mut Config)) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let mut config = test_config(temp.path());
        tweak(&mut config);

        let provider = Arc::new(provider);
        let transport = Arc::new(RecordingTransport::new());
        let membership = Arc::new(StaticMembership::new());

        let verification = Arc::new(VerificationTracker::new(
            config.verification.clone(),
            config.channels.clone(),
            membership.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let gate = Arc::new(AdmissionGate::new(verification.clone(), limiter.clone()));
        let orchestrator = Arc::new(DownloadOrchestrator::new(
            &config,
            provider.clone(),
            transport.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            verification.clone(),
            gate.clone(),
            orchestrator.clone(),
            transport.clone(),
        ));

        Self {
            config,
            dispatcher,
            orchestrator,
            verification,
            limiter,
            gate,
            provider,
            transport,
            membership,
            temp,
        }
    }

    pub async fn join_all(&self, user_id: i64) {
        self.membership.join(user_id, MAIN_CHANNEL).await;
        self.membership.join(user_id, EXTRA_CHANNEL).await;
    }

    pub async fn say(&self, user_id: i64, text: &str) {
        self.dispatcher
            .handle(Inbound::Message {
                user_id,
                chat_id: CHAT,
                display_name: Some("Tester".into()),
                text: text.to_string(),
            })
            .await;
    }

    /// Entries left under the temp root.
    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(self.temp.path()).unwrap().count()
    }
}
