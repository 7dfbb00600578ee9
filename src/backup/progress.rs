use tracing::{error, info};

/// Progress events emitted by a channel backup run.
///
/// Emitted at page granularity, not per message, to keep the progress
/// surface cheap.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// A page of messages was fully processed.
    Page {
        channel: &'a str,
        messages: u64,
        attachments_saved: u64,
    },
    Completed {
        channel: &'a str,
        messages: u64,
        attachments_saved: u64,
    },
    Failed {
        channel: &'a str,
        error: &'a str,
    },
}

/// Substitutable progress handle, passed into the orchestrator instead of
/// relying on ambient global state.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent<'_>);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent<'_>) {}
}

/// Default reporter: forwards events to the tracing surface.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::Page {
                channel,
                messages,
                attachments_saved,
            } => {
                info!(channel, messages, attachments_saved, "backup progress");
            }
            ProgressEvent::Completed {
                channel,
                messages,
                attachments_saved,
            } => {
                info!(channel, messages, attachments_saved, "backup complete");
            }
            ProgressEvent::Failed { channel, error } => {
                error!(channel, error, "backup failed");
            }
        }
    }
}
