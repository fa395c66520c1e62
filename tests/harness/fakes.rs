// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scriptable collaborators that record what the relay asked of them.

use async_trait::async_trait;
use gated_relay::error::CollaboratorError;
use gated_relay::provider::{ContentProvider, FileKind, FileSubtype, RemoteEntry};
use gated_relay::transport::{ChatId, Keyboard, MediaKind, MessageRef, Transport};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

pub const MIB: u64 = 1024 * 1024;

/// How fetches of one link behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchScript {
    Succeed,
    /// Every attempt fails
    Fail,
    /// The first `n` attempts never finish
    StallFirst(usize),
    /// Every attempt fails after writing a partial file
    FailAfterPartialWrite,
    /// Resolution panics
    PanicOnResolve,
}

#[derive(Debug, Clone)]
struct Scripted {
    entry: RemoteEntry,
    script: FetchScript,
}

/// Content provider keyed by URL path.
#[derive(Debug)]
pub struct FakeProvider {
    links: HashMap<String, Scripted>,
    fetch_delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    resolves: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            links: HashMap::new(),
            fetch_delay: Duration::from_millis(100),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            resolves: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn with_file(self, path: &str, name: &str, subtype: FileSubtype, size_bytes: u64) -> Self {
        self.with_script(path, name, subtype, size_bytes, FetchScript::Succeed)
    }

    pub fn with_script(
        mut self,
        path: &str,
        name: &str,
        subtype: FileSubtype,
        size_bytes: u64,
        script: FetchScript,
    ) -> Self {
        let entry = RemoteEntry {
            kind: FileKind::File,
            name: name.to_string(),
            size_bytes,
            subtype: Some(subtype),
        };
        self.links.insert(path.to_string(), Scripted { entry, script });
        self
    }

    pub fn with_folder(mut self, path: &str, name: &str, size_bytes: u64) -> Self {
        let entry = RemoteEntry {
            kind: FileKind::Folder,
            name: name.to_string(),
            size_bytes,
            subtype: None,
        };
        self.links.insert(
            path.to_string(),
            Scripted {
                entry,
                script: FetchScript::Succeed,
            },
        );
        self
    }

    /// Highest number of simultaneous fetches observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    /// Fetch attempts made for `path`.
    pub fn fetch_attempts(&self, path: &str) -> usize {
        self.attempts.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_fetch_attempts(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentProvider for FakeProvider {
    async fn resolve_link(&self, url: &Url) -> Result<RemoteEntry, CollaboratorError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .links
            .get(url.path())
            .ok_or_else(|| CollaboratorError::Rejected("share not found".into()))?;
        if scripted.script == FetchScript::PanicOnResolve {
            panic!("provider crashed resolving {url}");
        }
        Ok(scripted.entry.clone())
    }

    async fn fetch_to_path(
        &self,
        url: &Url,
        destination_dir: &Path,
    ) -> Result<PathBuf, CollaboratorError> {
        let scripted = self
            .links
            .get(url.path())
            .cloned()
            .ok_or_else(|| CollaboratorError::Rejected("share not found".into()))?;

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(url.path().to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match scripted.script {
            FetchScript::StallFirst(n) if attempt <= n => {
                std::future::pending::<()>().await;
            }
            FetchScript::Fail => {
                tokio::time::sleep(self.fetch_delay).await;
                return Err(CollaboratorError::Unavailable("connection reset".into()));
            }
            FetchScript::FailAfterPartialWrite => {
                tokio::fs::write(destination_dir.join("partial.part"), b"half").await?;
                return Err(CollaboratorError::Unavailable("connection reset".into()));
            }
            _ => {}
        }

        tokio::time::sleep(self.fetch_delay).await;
        let name = match scripted.entry.kind {
            FileKind::Folder => format!("{}.zip", scripted.entry.name),
            FileKind::File => scripted.entry.name.clone(),
        };
        let path = destination_dir.join(name);
        tokio::fs::write(&path, b"payload").await?;
        Ok(path)
    }
}

/// Something the relay sent through the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Media {
        chat_id: ChatId,
        kind: MediaKind,
        path: PathBuf,
        caption: String,
        /// Whether the file existed at send time
        existed: bool,
    },
    Edit {
        message: MessageRef,
        text: String,
    },
    Callback {
        callback_id: String,
        text: String,
    },
}

/// Transport that records every call.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    fail_media: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every media upload fail.
    pub fn fail_media(&self) {
        self.fail_media.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn media(&self) -> Vec<(MediaKind, String, bool)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Media {
                    kind,
                    caption,
                    existed,
                    ..
                } => Some((kind, caption, existed)),
                _ => None,
            })
            .collect()
    }

    pub fn callbacks(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Callback { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn keyboards(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Text { keyboard: Some(_), .. }))
            .count()
    }

    fn message(&self, chat_id: ChatId) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, CollaboratorError> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(self.message(chat_id))
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        kind: MediaKind,
        path: &Path,
        caption: &str,
    ) -> Result<MessageRef, CollaboratorError> {
        if self.fail_media.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected("upload refused".into()));
        }
        self.sent.lock().unwrap().push(Sent::Media {
            chat_id,
            kind,
            path: path.to_path_buf(),
            caption: caption.to_string(),
            existed: path.exists(),
        });
        Ok(self.message(chat_id))
    }

    async fn edit_text(&self, message: MessageRef, text: &str) -> Result<(), CollaboratorError> {
        self.sent.lock().unwrap().push(Sent::Edit {
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: &str,
    ) -> Result<(), CollaboratorError> {
        self.sent.lock().unwrap().push(Sent::Callback {
            callback_id: callback_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}
