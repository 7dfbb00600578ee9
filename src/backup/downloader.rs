use crate::api::{ApiClient, ChannelMessage};
use crate::utils::{atomic_write, ensure_dir, safe_filename};
use anyhow::Result;
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to one message's attachments.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Local filenames newly written this run, in attachment order.
    pub saved: Vec<String>,
    pub skipped: usize,
    pub failed: usize,
}

/// Fetches a message's attachments into a per-channel directory.
///
/// Filenames are derived deterministically from the message (see
/// [`attachment_filename`]) so an existing file means the attachment was
/// already saved by an earlier run and is skipped without a network request.
/// A single attachment failure is logged and skipped, never fatal.
pub struct AttachmentDownloader {
    api: Arc<ApiClient>,
    dir: PathBuf,
}

enum Outcome {
    Saved(String),
    Skipped,
    Failed,
}

impl AttachmentDownloader {
    pub fn new(api: Arc<ApiClient>, dir: PathBuf) -> Self {
        Self { api, dir }
    }

    /// Download every attachment of `message` that is not already on disk.
    ///
    /// The attachments of one message are fetched concurrently; results are
    /// reported in attachment order regardless of completion order. Only
    /// unrecoverable directory creation fails the call.
    pub async fn download(&self, message: &ChannelMessage) -> Result<DownloadReport> {
        let mut report = DownloadReport::default();
        if message.attachments.is_empty() {
            return Ok(report);
        }

        ensure_dir(&self.dir)?;

        let tasks = message.attachments.iter().enumerate().map(|(index, att)| {
            let name = attachment_filename(&message.timestamp, &message.author, index, &att.filename);
            self.fetch_one(att.url.clone(), name)
        });

        for outcome in join_all(tasks).await {
            match outcome {
                Outcome::Saved(name) => report.saved.push(name),
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed => report.failed += 1,
            }
        }
        Ok(report)
    }

    async fn fetch_one(&self, url: String, name: String) -> Outcome {
        let path = self.dir.join(&name);
        if path.exists() {
            debug!(file = %name, "attachment already saved, skipping");
            return Outcome::Skipped;
        }

        let bytes = match self.api.fetch_bytes(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "failed to download attachment");
                return Outcome::Failed;
            }
        };

        match atomic_write(&path, &bytes) {
            Ok(()) => {
                debug!(file = %name, bytes = bytes.len(), "saved attachment");
                Outcome::Saved(name)
            }
            Err(e) => {
                warn!(file = %name, error = %e, "failed to write attachment");
                Outcome::Failed
            }
        }
    }
}

/// Deterministic local filename for an attachment.
///
/// `<timestamp>_<author>_<index>_<original>`, all components sanitized for
/// the filesystem. The zero-based index disambiguates two same-named
/// attachments on one message; timestamp + author disambiguate identically
/// named uploads from different messages.
pub fn attachment_filename(timestamp: &str, author: &str, index: usize, original: &str) -> String {
    format!(
        "{}_{}_{:02}_{}",
        safe_filename(timestamp),
        safe_filename(author),
        index,
        safe_filename(original)
    )
}
