use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Upload progress recorded after each committed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCheckpoint {
    pub spreadsheet: String,
    pub fingerprint: String,
    pub batch_size: usize,
    pub batches_committed: usize,
    pub updated_at: DateTime<Utc>,
}

impl UploadCheckpoint {
    /// True when this checkpoint was written for the same table, target and batching
    pub fn matches(&self, spreadsheet: &str, fingerprint: &str, batch_size: usize) -> bool {
        self.spreadsheet == spreadsheet
            && self.fingerprint == fingerprint
            && self.batch_size == batch_size
    }
}

/// JSON file holding the last upload checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<UploadCheckpoint>, CheckpointError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let checkpoint = serde_json::from_str(&data)?;
        debug!("Loaded checkpoint from {}", self.path.display());
        Ok(Some(checkpoint))
    }

    /// Written to a sibling temp file, then renamed into place
    pub fn save(&self, checkpoint: &UploadCheckpoint) -> Result<(), CheckpointError> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(checkpoint)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(
            batches_committed = checkpoint.batches_committed,
            "Checkpoint saved"
        );
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CheckpointError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!("Cleared upload checkpoint {}", self.path.display());
        }
        Ok(())
    }
}
