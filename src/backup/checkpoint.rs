use crate::utils::atomic_write;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Durable record of the last fully-processed message id for a channel.
///
/// One file per channel (`last_message_<channel>.txt`), overwritten on each
/// advance. A missing file means a fresh backup, never an error. Writes go
/// through tempfile + rename so a crash mid-write cannot corrupt the record.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, channel: &str) -> PathBuf {
        self.dir
            .join(format!("last_message_{}.txt", crate::utils::safe_filename(channel)))
    }

    /// Last recorded message id, or `None` when no checkpoint exists.
    pub fn read(&self, channel: &str) -> Result<Option<String>> {
        let path = self.path_for(channel);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;
        let id = content.trim().to_string();
        Ok(if id.is_empty() { None } else { Some(id) })
    }

    /// Record `message_id` as the new checkpoint, replacing any prior value.
    /// Idempotent under repeated writes of the same value.
    pub fn write(&self, channel: &str, message_id: &str) -> Result<()> {
        let path = self.path_for(channel);
        atomic_write(&path, message_id.as_bytes())
            .with_context(|| format!("Failed to write checkpoint: {}", path.display()))
    }
}
