// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fetch-then-deliver jobs for content-host links.
//!
//! Every link in a request becomes one job: validate and resolve, check the
//! platform size ceiling, fetch into a private temp directory while holding a
//! slot of the global download pool, then deliver with the media kind its
//! type and size allow. Jobs are independent; one failing link never stops
//! the next. The temp directory is removed before the job returns, whatever
//! the outcome.

use crate::config::{Config, DeliveryLimits, DownloadConfig};
use crate::error::{CollaboratorError, JobError};
use crate::messages;
use crate::provider::{ContentProvider, FileInfo, FileKind, FileSubtype};
use crate::transport::{ChatId, MediaKind, MessageRef, Transport};
use crate::validator::LinkValidator;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// A successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub media: MediaKind,
    pub message: MessageRef,
    pub size_bytes: u64,
}

/// Outcome of one link.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub link: String,
    /// Present once the link resolved
    pub info: Option<FileInfo>,
    pub result: Result<Delivered, JobError>,
}

/// Per-link outcomes of one request, in link order.
#[derive(Debug, Clone, Default)]
pub struct JobSummary {
    pub outcomes: Vec<LinkOutcome>,
}

impl JobSummary {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &JobError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.link.as_str(), e)))
    }
}

/// Private job directory, removed exactly once.
///
/// [`release`](Self::release) removes it on the normal path; dropping an
/// unreleased artifact (panic, cancelled future) removes it synchronously.
#[derive(Debug)]
pub struct TempArtifact {
    dir: PathBuf,
    file: Option<PathBuf>,
    released: bool,
}

impl TempArtifact {
    async fn allocate(root: &Path) -> io::Result<Self> {
        let dir = root.join(format!("job_{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            file: None,
            released: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The fetched file, once the fetch succeeded.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// A file the provider wrote outside the job directory.
    fn stray_file(&self) -> Option<&Path> {
        self.file.as_deref().filter(|f| !f.starts_with(&self.dir))
    }

    pub async fn release(mut self) {
        self.released = true;
        if let Some(stray) = self.stray_file() {
            log_removal(stray, tokio::fs::remove_file(stray).await);
        }
        log_removal(&self.dir, tokio::fs::remove_dir_all(&self.dir).await);
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(stray) = self.stray_file() {
            log_removal(stray, std::fs::remove_file(stray));
        }
        log_removal(&self.dir, std::fs::remove_dir_all(&self.dir));
    }
}

fn log_removal(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => debug!(path = %path.display(), "Removed temp artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp artifact"),
    }
}

/// Pick the delivery kind for a file of `size` bytes.
///
/// Video and photo delivery fall back to document delivery above their own
/// ceilings; only the platform and document ceilings reject.
pub fn route_delivery(
    info: &FileInfo,
    size: u64,
    is_archive: bool,
    limits: &DeliveryLimits,
) -> Result<MediaKind, JobError> {
    if size > limits.max_file_size {
        return Err(JobError::FileTooLarge {
            size,
            limit: limits.max_file_size,
        });
    }

    let media = match (info.kind, info.subtype) {
        _ if is_archive => MediaKind::Document,
        (FileKind::Folder, _) => MediaKind::Document,
        (FileKind::File, FileSubtype::Video) if size <= limits.max_video_size => MediaKind::Video,
        (FileKind::File, FileSubtype::Image) if size <= limits.max_photo_size => MediaKind::Photo,
        _ => MediaKind::Document,
    };

    if media == MediaKind::Document && size > limits.max_document_size {
        return Err(JobError::FileTooLarge {
            size,
            limit: limits.max_document_size,
        });
    }
    Ok(media)
}

pub struct DownloadOrchestrator {
    provider: Arc<dyn ContentProvider>,
    transport: Arc<dyn Transport>,
    validator: LinkValidator,
    download: DownloadConfig,
    limits: DeliveryLimits,
    temp_root: PathBuf,
    slots: Semaphore,
}

impl DownloadOrchestrator {
    pub fn new(
        config: &Config,
        provider: Arc<dyn ContentProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            provider,
            transport,
            validator: LinkValidator::new(config.links.clone()),
            download: config.download.clone(),
            limits: config.delivery.clone(),
            temp_root: config.storage.temp_dir.clone(),
            slots: Semaphore::new(config.download.concurrent_downloads),
        }
    }

    /// Free download slots right now.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Validate the link, then ask the provider what it points at.
    pub async fn resolve(&self, link: &str) -> Result<(Url, FileInfo), JobError> {
        let url = self
            .validator
            .validate(link)
            .map_err(|e| JobError::LinkInvalid(e.to_string()))?;

        let timeout = self.download.download_timeout();
        let entry = tokio::time::timeout(timeout, self.provider.resolve_link(&url))
            .await
            .unwrap_or(Err(CollaboratorError::Timeout))
            .map_err(|e| JobError::ResolveFailed(e.to_string()))?;

        Ok((url, FileInfo::from(entry)))
    }

    pub fn enforce_size_limit(&self, info: &FileInfo) -> Result<(), JobError> {
        if info.size_bytes > self.limits.max_file_size {
            return Err(JobError::FileTooLarge {
                size: info.size_bytes,
                limit: self.limits.max_file_size,
            });
        }
        Ok(())
    }

    /// Fetch with retries. Each attempt waits for its own pool slot and is
    /// bounded by the download timeout, slot wait included.
    pub async fn fetch(&self, url: &Url, info: &FileInfo) -> Result<TempArtifact, JobError> {
        let attempts = self.download.retry_attempts + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.fetch_once(url).await {
                Ok(artifact) => {
                    debug!(link = %url, name = %info.display_name, attempt, "Fetched");
                    return Ok(artifact);
                }
                Err(reason) => {
                    warn!(link = %url, attempt, attempts, error = %reason, "Fetch attempt failed");
                    last_error = reason;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.download.retry_delay() * attempt).await;
            }
        }

        Err(JobError::FetchFailed(format!(
            "{last_error} (after {attempts} attempts)"
        )))
    }

    async fn fetch_once(&self, url: &Url) -> Result<TempArtifact, String> {
        let mut artifact = TempArtifact::allocate(&self.temp_root)
            .await
            .map_err(|e| format!("temp storage unavailable: {e}"))?;

        let timeout = self.download.download_timeout();
        let fetched = tokio::time::timeout(timeout, async {
            let _slot = self
                .slots
                .acquire()
                .await
                .map_err(|_| CollaboratorError::Unavailable("download pool closed".into()))?;
            self.provider.fetch_to_path(url, artifact.dir()).await
        })
        .await;

        match fetched {
            Ok(Ok(path)) => {
                artifact.file = Some(path);
                Ok(artifact)
            }
            Ok(Err(e)) => {
                artifact.release().await;
                Err(e.to_string())
            }
            Err(_) => {
                artifact.release().await;
                Err(format!("timed out after {timeout:?}"))
            }
        }
    }

    /// Deliver a fetched artifact to `chat_id`.
    pub async fn dispatch(
        &self,
        chat_id: ChatId,
        artifact: &TempArtifact,
        info: &FileInfo,
    ) -> Result<Delivered, JobError> {
        let path = artifact
            .path()
            .ok_or_else(|| JobError::DispatchFailed("nothing was fetched".into()))?;
        let on_disk = tokio::fs::metadata(path)
            .await
            .map_err(|e| JobError::DispatchFailed(format!("artifact unreadable: {e}")))?
            .len();

        let size = on_disk.max(info.size_bytes);
        let is_archive = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        let media = route_delivery(info, size, is_archive, &self.limits)?;

        let caption = messages::caption(info, media, size);
        let message = self
            .transport
            .send_media(chat_id, media, path, &caption)
            .await
            .map_err(|e| JobError::DispatchFailed(e.to_string()))?;

        Ok(Delivered {
            media,
            message,
            size_bytes: size,
        })
    }

    /// Run one link end to end.
    pub async fn process_link(&self, chat_id: ChatId, link: &str) -> LinkOutcome {
        let mut info = None;
        let result = self.run_job(chat_id, link, &mut info).await;
        match &result {
            Ok(delivered) => info!(
                link = %link,
                media = delivered.media.as_str(),
                size_bytes = delivered.size_bytes,
                "Delivered"
            ),
            Err(e) => warn!(link = %link, code = e.code(), error = %e, "Link failed"),
        }
        LinkOutcome {
            link: link.to_string(),
            info,
            result,
        }
    }

    async fn run_job(
        &self,
        chat_id: ChatId,
        link: &str,
        resolved: &mut Option<FileInfo>,
    ) -> Result<Delivered, JobError> {
        let (url, info) = self.resolve(link).await?;
        *resolved = Some(info.clone());
        self.enforce_size_limit(&info)?;

        let artifact = self.fetch(&url, &info).await?;
        let delivered = self.dispatch(chat_id, &artifact, &info).await;
        artifact.release().await;
        delivered
    }

    /// Process a request's links one after another.
    pub async fn process_links(&self, chat_id: ChatId, links: &[String]) -> JobSummary {
        let mut summary = JobSummary::default();
        for link in links {
            summary.outcomes.push(self.process_link(chat_id, link).await);
        }
        summary
    }
}
