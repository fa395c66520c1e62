// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-process collaborators for running the relay without a live platform.
//!
//! - [`LogTransport`] writes outgoing messages to the log
//! - [`StaticMembership`] answers membership from an in-memory table
//! - [`SimulatedProvider`] fabricates metadata and placeholder files
//!
//! None of these talk to the network.

use crate::config::ChannelRequirement;
use crate::error::CollaboratorError;
use crate::membership::{MembershipProvider, MembershipStatus};
use crate::provider::{ContentProvider, FileKind, FileSubtype, RemoteEntry};
use crate::transport::{ChatId, Keyboard, MediaKind, MessageRef, Transport};
use crate::UserId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

const MIB: u64 = 1024 * 1024;

/// Logs every outgoing message instead of sending it.
#[derive(Debug, Default)]
pub struct LogTransport {
    next_id: AtomicI64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self, chat_id: ChatId) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, CollaboratorError> {
        let message = self.next(chat_id);
        info!(
            chat_id,
            message_id = message.message_id,
            buttons = keyboard.map_or(0, |k| k.rows.len()),
            text,
            "send_text"
        );
        Ok(message)
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        path: &Path,
        caption: &str,
    ) -> Result<MessageRef, CollaboratorError> {
        let message = self.next(chat_id);
        info!(
            chat_id,
            message_id = message.message_id,
            kind = kind.as_str(),
            path = %path.display(),
            caption,
            "send_media"
        );
        Ok(message)
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), CollaboratorError> {
        info!(chat_id = message.chat_id, message_id = message.message_id, text, "edit_text");
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
    ) -> Result<(), CollaboratorError> {
        info!(callback_id, text, "answer_callback");
        Ok(())
    }
}

/// Membership table held in memory.
#[derive(Debug, Default)]
pub struct StaticMembership {
    allow_all: bool,
    joined: RwLock<HashMap<String, HashSet<UserId>>>,
    failing: RwLock<HashSet<String>>,
}

impl StaticMembership {
    /// Nobody is a member until [`join`](Self::join) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everybody is a member of every channel.
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            ..Self::default()
        }
    }

    /// Every user in `members` has joined every channel in `channels`.
    pub async fn seeded(
        members: impl IntoIterator<Item = UserId>,
        channels: &[ChannelRequirement],
    ) -> Self {
        let membership = Self::new();
        for user_id in members {
            for channel in channels {
                membership.join(user_id, &channel.id).await;
            }
        }
        membership
    }

    pub async fn join(&self, user_id: UserId, channel_id: &str) {
        self.joined
            .write()
            .await
            .entry(channel_id.to_string())
            .or_default()
            .insert(user_id);
    }

    pub async fn leave(&self, user_id: UserId, channel_id: &str) {
        if let Some(members) = self.joined.write().await.get_mut(channel_id) {
            members.remove(&user_id);
        }
    }

    /// Make lookups for `channel_id` fail.
    pub async fn fail_channel(&self, channel_id: &str) {
        self.failing.write().await.insert(channel_id.to_string());
    }
}

#[async_trait]
impl MembershipProvider for StaticMembership {
    async fn membership_status(
        &self,
        user_id: UserId,
        channel_id: &str,
    ) -> Result<MembershipStatus, CollaboratorError> {
        if self.failing.read().await.contains(channel_id) {
            return Err(CollaboratorError::Unavailable(format!(
                "lookup for {channel_id} failed"
            )));
        }
        if self.allow_all {
            return Ok(MembershipStatus::Member);
        }
        let joined = self
            .joined
            .read()
            .await
            .get(channel_id)
            .is_some_and(|members| members.contains(&user_id));
        Ok(if joined {
            MembershipStatus::Member
        } else {
            MembershipStatus::None
        })
    }
}

/// Fabricates content: `/s/` links are folders, files are typed by extension.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    /// Simulated transfer time per MiB
    pub latency_per_mib: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self {
            latency_per_mib: Duration::from_millis(100),
            min_latency: Duration::from_secs(1),
            max_latency: Duration::from_secs(30),
        }
    }
}

impl SimulatedProvider {
    fn describe(url: &Url) -> RemoteEntry {
        if url.path().contains("/s/") {
            return RemoteEntry {
                kind: FileKind::Folder,
                name: "Shared Folder".to_string(),
                size_bytes: 150 * MIB,
                subtype: None,
            };
        }

        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or("shared_file")
            .to_string();
        let subtype = FileSubtype::from_name(&name);
        let size_bytes = match subtype {
            FileSubtype::Video => 100 * MIB,
            FileSubtype::Image => 5 * MIB,
            FileSubtype::Document => 10 * MIB,
            FileSubtype::Other => 50 * MIB,
        };
        RemoteEntry {
            kind: FileKind::File,
            name,
            size_bytes,
            subtype: Some(subtype),
        }
    }

    fn latency(&self, size_bytes: u64) -> Duration {
        let scaled = self.latency_per_mib.saturating_mul((size_bytes / MIB) as u32);
        scaled.clamp(self.min_latency, self.max_latency)
    }
}

#[async_trait]
impl ContentProvider for SimulatedProvider {
    async fn resolve_link(&self, url: &Url) -> Result<RemoteEntry, CollaboratorError> {
        Ok(Self::describe(url))
    }

    async fn fetch_to_path(
        &self,
        url: &Url,
        destination_dir: &Path,
    ) -> Result<PathBuf, CollaboratorError> {
        let entry = Self::describe(url);
        tokio::time::sleep(self.latency(entry.size_bytes)).await;

        let extension = match (entry.kind, entry.subtype) {
            (FileKind::Folder, _) => "zip",
            (_, Some(FileSubtype::Video)) => "mp4",
            (_, Some(FileSubtype::Image)) => "jpg",
            (_, Some(FileSubtype::Document)) => "pdf",
            _ => "bin",
        };
        let path = destination_dir.join(format!("content.{extension}"));
        tokio::fs::write(&path, b"simulated content").await?;
        Ok(path)
    }
}
