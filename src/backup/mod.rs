pub mod checkpoint;
pub mod downloader;
pub mod fetcher;
pub mod orchestrator;
pub mod progress;

pub use checkpoint::CheckpointStore;
pub use downloader::AttachmentDownloader;
pub use fetcher::{MessageFetcher, RetryPolicy};
pub use orchestrator::{BackupOrchestrator, RunSummary};
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressReporter};
