//! Model Checkpointing
//!
//! Checkpoints live in a run's `model/` directory as
//! `checkpoint-<step>.json`. The step tag is the only link between a saved
//! model and the training progress that produced it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;

const PREFIX: &str = "checkpoint-";
const EXTENSION: &str = "json";

/// Checkpointer for saving and loading model records
pub struct Checkpointer {
    /// Directory for checkpoints
    checkpoint_dir: PathBuf,
}

impl Checkpointer {
    /// Create a checkpointer over `checkpoint_dir`; nothing is created on disk
    /// until the first save.
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Get checkpoint path for a given step
    pub fn checkpoint_path(&self, step: u64) -> PathBuf {
        self.checkpoint_dir
            .join(format!("{}{}.{}", PREFIX, step, EXTENSION))
    }

    /// Serialize `record` as the checkpoint for `step`
    pub fn save<T: Serialize>(&self, record: &T, step: u64) -> Result<PathBuf> {
        if !self.checkpoint_dir.exists() {
            fs::create_dir_all(&self.checkpoint_dir)?;
        }

        if let Some(latest) = self.latest_checkpoint() {
            if latest > step {
                warn!(
                    "Saving checkpoint at step {} below existing latest step {}",
                    step, latest
                );
            }
        }

        let path = self.checkpoint_path(step);
        if path.exists() {
            warn!("Overwriting checkpoint {:?}", path);
        }

        // Write then rename so a crash never leaves a truncated checkpoint.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(record)?)?;
        fs::rename(&tmp, &path)?;

        info!("Saved checkpoint to {:?}", path);
        Ok(path)
    }

    /// Deserialize the checkpoint for `step`
    pub fn load<T: DeserializeOwned>(&self, step: u64) -> Result<T> {
        let bytes = fs::read(self.checkpoint_path(step))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// List available checkpoint steps in ascending order
    pub fn list_checkpoints(&self) -> Vec<u64> {
        let mut steps = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.checkpoint_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(step) = parse_step(name) {
                        steps.push(step);
                    }
                }
            }
        }

        steps.sort_unstable();
        steps
    }

    /// Get latest checkpoint step
    pub fn latest_checkpoint(&self) -> Option<u64> {
        self.list_checkpoints().into_iter().last()
    }

    /// Check if a checkpoint exists
    pub fn exists(&self, step: u64) -> bool {
        self.checkpoint_path(step).exists()
    }
}

fn parse_step(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix(PREFIX)?
        .strip_suffix(EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()
}
