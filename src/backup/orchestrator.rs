use crate::api::{ApiClient, ChannelMessage};
use crate::backup::checkpoint::CheckpointStore;
use crate::backup::downloader::AttachmentDownloader;
use crate::backup::fetcher::{MessageFetcher, RetryPolicy};
use crate::backup::progress::{ProgressEvent, ProgressReporter};
use crate::config::Config;
use crate::errors::VaultError;
use crate::utils::{ensure_dir, safe_filename};
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Totals for one channel run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub messages: u64,
    pub attachments_saved: u64,
}

/// Drives one channel's backup to completion or to a fatal error.
///
/// Messages are processed strictly in the order the fetcher yields them;
/// the checkpoint only advances after a message's log line is written and
/// its attachment downloads have been attempted, so an interrupted run
/// loses at most the in-flight message.
pub struct BackupOrchestrator {
    api: Arc<ApiClient>,
    root: PathBuf,
    page_limit: u32,
    request_delay: Duration,
    retry: RetryPolicy,
    progress: Arc<dyn ProgressReporter>,
}

impl BackupOrchestrator {
    pub fn new(api: Arc<ApiClient>, config: &Config, progress: Arc<dyn ProgressReporter>) -> Self {
        Self {
            api,
            root: PathBuf::from(&config.backup_root),
            page_limit: config.page_limit,
            request_delay: Duration::from_millis(config.request_delay_ms),
            retry: RetryPolicy {
                max_attempts: config.max_retries,
                ..RetryPolicy::default()
            },
            progress,
        }
    }

    /// Back up one channel, reporting completion or failure on the progress
    /// surface. On a fatal error the checkpoint is already durable at the
    /// last fully-processed message, so the next run resumes cleanly.
    pub async fn backup_channel(
        &self,
        channel_name: &str,
        channel_id: &str,
    ) -> Result<RunSummary, VaultError> {
        match self.run(channel_name, channel_id).await {
            Ok(summary) => {
                self.progress.report(ProgressEvent::Completed {
                    channel: channel_name,
                    messages: summary.messages,
                    attachments_saved: summary.attachments_saved,
                });
                Ok(summary)
            }
            Err(e) => {
                self.progress.report(ProgressEvent::Failed {
                    channel: channel_name,
                    error: &e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, channel_name: &str, channel_id: &str) -> Result<RunSummary, VaultError> {
        let channel_dir = ensure_dir(self.root.join(safe_filename(channel_name)))?;
        let checkpoints = CheckpointStore::new(&channel_dir);
        let resume_from = checkpoints.read(channel_name)?;

        info!(
            channel = channel_name,
            channel_id,
            resume_from = resume_from.as_deref().unwrap_or("(start)"),
            "starting channel backup"
        );

        let log_path = channel_dir.join(format!("{}_messages.txt", safe_filename(channel_name)));
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open message log: {}", log_path.display()))?;

        let downloader =
            AttachmentDownloader::new(self.api.clone(), channel_dir.join("attachments"));
        let mut fetcher = MessageFetcher::new(
            self.api.clone(),
            channel_id,
            resume_from,
            self.page_limit,
            self.request_delay,
            self.retry.clone(),
        );

        let mut summary = RunSummary::default();
        while let Some(page) = fetcher.next_page().await? {
            for message in &page {
                self.process_message(message, &mut log, &downloader, &mut summary)
                    .await?;
                checkpoints.write(channel_name, &message.id)?;
            }
            self.progress.report(ProgressEvent::Page {
                channel: channel_name,
                messages: summary.messages,
                attachments_saved: summary.attachments_saved,
            });
        }

        Ok(summary)
    }

    async fn process_message(
        &self,
        message: &ChannelMessage,
        log: &mut File,
        downloader: &AttachmentDownloader,
        summary: &mut RunSummary,
    ) -> Result<(), VaultError> {
        // Keep the log line-oriented even for multi-line message bodies.
        let body = message.content.replace(['\n', '\r'], " ");
        writeln!(
            log,
            "[{}] {}: {}",
            message.timestamp, message.author, body
        )
        .context("Failed to append to message log")?;

        let report = downloader.download(message).await?;
        for name in &report.saved {
            writeln!(
                log,
                "[{}] {} shared an attachment: attachments/{}",
                message.timestamp, message.author, name
            )
            .context("Failed to append to message log")?;
        }

        log.flush().context("Failed to flush message log")?;

        summary.messages += 1;
        summary.attachments_saved += report.saved.len() as u64;
        Ok(())
    }
}
