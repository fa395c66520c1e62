// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Content provider collaborator and the file metadata it reports.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSubtype {
    Video,
    Image,
    Document,
    Other,
}

impl FileSubtype {
    /// Guess the subtype from a file name's extension.
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("mp4" | "mkv" | "avi" | "mov" | "webm") => Self::Video,
            Some("jpg" | "jpeg" | "png" | "gif" | "webp") => Self::Image,
            Some("pdf" | "doc" | "docx" | "txt") => Self::Document,
            _ => Self::Other,
        }
    }
}

/// What the provider reports for a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub kind: FileKind,
    pub name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub subtype: Option<FileSubtype>,
}

/// Resolved metadata for one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub kind: FileKind,
    pub subtype: FileSubtype,
    pub size_bytes: u64,
    pub display_name: String,
}

impl From<RemoteEntry> for FileInfo {
    fn from(entry: RemoteEntry) -> Self {
        let subtype = match entry.kind {
            FileKind::Folder => FileSubtype::Other,
            FileKind::File => entry
                .subtype
                .unwrap_or_else(|| FileSubtype::from_name(&entry.name)),
        };
        Self {
            kind: entry.kind,
            subtype,
            size_bytes: entry.size_bytes,
            display_name: entry.name,
        }
    }
}

/// The content host. Its wire protocol is the implementor's business.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Look up what a share link points at.
    async fn resolve_link(&self, url: &Url) -> Result<RemoteEntry, CollaboratorError>;

    /// Download the content into `destination_dir` and return the written path.
    ///
    /// Folders are delivered as a single archive.
    async fn fetch_to_path(
        &self,
        url: &Url,
        destination_dir: &Path,
    ) -> Result<PathBuf, CollaboratorError>;
}
