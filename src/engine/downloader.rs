//! Unit downloader
//!
//! Processes exactly one work item:
//! 1. Resolves the on-disk path from the item's file name (or the URL basename)
//! 2. Skips the network fetch when a local file with the same content hash exists
//! 3. Holds one admission ticket while fetching the file and writing the tag sidecar
//! 4. Classifies the attempt as success, duplicate or error

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::stream::StreamExt;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument, warn};

use crate::engine::hasher::{HashAlgorithm, digests_match, hash_file};
use crate::engine::ticket::TicketPool;

/// Error types for the unit downloader
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to create download task for \"{file_name}\": {reason}")]
    Task { file_name: String, reason: String },

    #[error("Admission pool closed")]
    PoolClosed,
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;

/// One unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: u64,
    pub file_url: String,
    /// On-disk basename. Falls back to the URL basename.
    pub file_name: Option<String>,
    /// Hex digest of the remote file, enables the duplicate check.
    pub content_hash: Option<String>,
    pub tag_text: Option<String>,
}

/// Terminal classification of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Duplicate,
    Error,
}

/// Result of processing one work item.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub path: PathBuf,
    pub started_at: Instant,
    pub finished_at: Instant,
    /// Bytes on disk after the attempt. Always 0 for duplicates.
    pub bytes: u64,
    pub tag_text: Option<String>,
    pub content_hash: Option<String>,
}

/// Result of one sub-task (file fetch or tag write).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed,
    Panicked(String),
}

/// Any step that did not succeed makes the attempt an error. A clean
/// attempt that skipped the fetch is a duplicate.
pub fn classify(steps: &[StepStatus], is_duplicate: bool) -> OutcomeKind {
    if steps.iter().any(|step| *step != StepStatus::Succeeded) {
        OutcomeKind::Error
    } else if is_duplicate {
        OutcomeKind::Duplicate
    } else {
        OutcomeKind::Success
    }
}

/// The name the file is stored under.
pub fn resolve_file_name(item: &WorkItem) -> DownloadResult<String> {
    let name = match item.file_name.as_deref() {
        Some(name) => name.to_string(),
        None => url_basename(&item.file_url),
    };

    let reason = if name.is_empty() {
        Some("empty file name")
    } else if name == "." || name == ".." {
        Some("file name is a relative directory")
    } else if name.contains('/') || name.contains('\\') {
        Some("file name contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DownloadError::Task {
            file_name: if name.is_empty() { item.file_url.clone() } else { name },
            reason: reason.to_string(),
        }),
        None => Ok(name),
    }
}

fn url_basename(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    without_query.rsplit('/').next().unwrap_or_default().to_string()
}

/// `target_dir/<stem>.txt` for a file stored as `file_name`.
pub fn sidecar_path(target_dir: &Path, file_name: &str) -> PathBuf {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    target_dir.join(format!("{stem}.txt"))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one sub-task, turning a panic into a captured fault.
async fn guarded<F>(step: F) -> StepStatus
where
    F: Future<Output = bool>,
{
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(true) => StepStatus::Succeeded,
        Ok(false) => StepStatus::Failed,
        Err(panic) => StepStatus::Panicked(panic_message(panic.as_ref())),
    }
}

async fn write_tags(tags: &str, txt_path: &Path) -> bool {
    match tokio::fs::write(txt_path, tags).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to write tags to {}: {}", txt_path.display(), e);
            false
        }
    }
}

/// Downloads single work items. Cheap to clone; every clone shares the
/// client and the admission pool.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    tickets: Arc<TicketPool>,
    timeout: Option<Duration>,
    hash_algorithm: HashAlgorithm,
}

impl Downloader {
    pub fn new(
        client: Client,
        tickets: Arc<TicketPool>,
        timeout: Option<Duration>,
        hash_algorithm: HashAlgorithm,
    ) -> Self {
        Self {
            client,
            tickets,
            timeout,
            hash_algorithm,
        }
    }

    pub fn tickets(&self) -> &Arc<TicketPool> {
        &self.tickets
    }

    /// Download `item` into `target_dir` and write its tag sidecar.
    ///
    /// Transport, status and disk failures come back as an
    /// [`OutcomeKind::Error`] outcome. An `Err` means the task could not be
    /// built at all (bad file name) or the admission pool was closed.
    #[instrument(skip(self, target_dir, item), fields(id = item.id, url = %item.file_url))]
    pub async fn download(&self, target_dir: &Path, item: &WorkItem) -> DownloadResult<Outcome> {
        let file_name = resolve_file_name(item)?;
        let file_path = target_dir.join(&file_name);

        let is_duplicate = match item.content_hash.as_deref() {
            Some(expected) => self.matches_local_file(&file_path, expected).await,
            None => false,
        };

        let _ticket = self.tickets.acquire().await.map_err(|_| DownloadError::PoolClosed)?;

        let fetch = async {
            if is_duplicate {
                None
            } else {
                Some(guarded(self.fetch_to_file(&item.file_url, &file_path)).await)
            }
        };
        let tags = async {
            match item.tag_text.as_deref() {
                Some(tags) if !tags.is_empty() => {
                    let txt_path = sidecar_path(target_dir, &file_name);
                    Some(guarded(write_tags(tags, &txt_path)).await)
                }
                _ => None,
            }
        };

        let started_at = Instant::now();
        let (fetch_status, tag_status) = tokio::join!(fetch, tags);
        let finished_at = Instant::now();

        let steps: Vec<StepStatus> = [fetch_status, tag_status].into_iter().flatten().collect();
        for step in &steps {
            if let StepStatus::Panicked(message) = step {
                error!("Sub-task for {} panicked: {}", file_name, message);
            }
        }
        let kind = classify(&steps, is_duplicate);

        let bytes = match kind {
            OutcomeKind::Duplicate => 0,
            _ => tokio::fs::metadata(&file_path)
                .await
                .map(|m| if m.is_file() { m.len() } else { 0 })
                .unwrap_or(0),
        };

        debug!("{} -> {:?} ({} bytes)", file_name, kind, bytes);

        Ok(Outcome {
            kind,
            path: file_path,
            started_at,
            finished_at,
            bytes,
            tag_text: item.tag_text.clone(),
            content_hash: item.content_hash.clone(),
        })
    }

    /// True only when the file exists and its digest equals `expected`.
    async fn matches_local_file(&self, file_path: &Path, expected: &str) -> bool {
        match tokio::fs::try_exists(file_path).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!("Could not check {} for duplicates: {}", file_path.display(), e);
                return false;
            }
        }

        match hash_file(file_path, self.hash_algorithm).await {
            Ok(actual) => digests_match(&actual, expected),
            Err(e) => {
                error!("Failed to hash {} for duplicate check: {}", file_path.display(), e);
                false
            }
        }
    }

    async fn fetch_to_file(&self, url: &str, file_path: &Path) -> bool {
        match self.stream_to_file(url, file_path).await {
            Ok(written) => {
                debug!("Fetched {} ({} bytes)", url, written);
                true
            }
            Err(e) => {
                error!("Failed to download {}: {}", url, e);
                false
            }
        }
    }

    /// Stream a response to a file
    async fn stream_to_file(&self, url: &str, file_path: &Path) -> DownloadResult<u64> {
        let mut request = self.client.get(url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::InvalidResponse(match status {
                StatusCode::UNAUTHORIZED => "Authentication failed (401 Unauthorized)".to_string(),
                StatusCode::FORBIDDEN => "Access forbidden (403 Forbidden)".to_string(),
                StatusCode::NOT_FOUND => {
                    "Resource not found (404 Not Found). The file may have been deleted".to_string()
                }
                StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded (429)".to_string(),
                _ => format!("HTTP error: {}", status),
            }));
        }

        let mut file = File::create(file_path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        // Ensure all data is written to disk
        file.flush().await?;

        Ok(written)
    }
}
