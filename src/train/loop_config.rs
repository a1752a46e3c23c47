use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};
use crate::train::checkpoint::CheckpointKind;

/// Configuration for a `TrainLoop::run`.
///
/// # Fields
/// - `epochs_qty`            — total epochs of the run, counting resumed ones
/// - `output_path`           — directory for checkpoints and metric tables;
///                             created if missing
/// - `load_best_checkpoint`  — resume from `model_best.json`
/// - `save_best_checkpoint`  — write `model_best.json` whenever validation
///                             loss strictly improves
/// - `load_last_checkpoint`  — resume from `model_last.json`
/// - `save_last_checkpoint`  — overwrite `model_last.json` every epoch
/// - `save_all_checkpoints`  — keep `checkpoint<epoch>.json` for every epoch
///
/// At most one of the two `load_*` flags may be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub epochs_qty: usize,
    pub output_path: PathBuf,
    #[serde(default)]
    pub load_best_checkpoint: bool,
    #[serde(default)]
    pub save_best_checkpoint: bool,
    #[serde(default)]
    pub load_last_checkpoint: bool,
    #[serde(default)]
    pub save_last_checkpoint: bool,
    #[serde(default)]
    pub save_all_checkpoints: bool,
}

impl LoopConfig {
    /// Creates a config that neither resumes nor saves checkpoints.
    pub fn new(epochs_qty: usize, output_path: impl Into<PathBuf>) -> Self {
        LoopConfig {
            epochs_qty,
            output_path: output_path.into(),
            load_best_checkpoint: false,
            save_best_checkpoint: false,
            load_last_checkpoint: false,
            save_last_checkpoint: false,
            save_all_checkpoints: false,
        }
    }

    pub fn with_load_best(mut self, on: bool) -> Self {
        self.load_best_checkpoint = on;
        self
    }

    pub fn with_save_best(mut self, on: bool) -> Self {
        self.save_best_checkpoint = on;
        self
    }

    pub fn with_load_last(mut self, on: bool) -> Self {
        self.load_last_checkpoint = on;
        self
    }

    pub fn with_save_last(mut self, on: bool) -> Self {
        self.save_last_checkpoint = on;
        self
    }

    pub fn with_save_all(mut self, on: bool) -> Self {
        self.save_all_checkpoints = on;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.load_best_checkpoint && self.load_last_checkpoint {
            return Err(TrainError::ConflictingResume);
        }
        Ok(())
    }

    /// The checkpoint to resume from, if any.
    pub fn resume_from(&self) -> Option<CheckpointKind> {
        if self.load_best_checkpoint {
            Some(CheckpointKind::Best)
        } else if self.load_last_checkpoint {
            Some(CheckpointKind::Last)
        } else {
            None
        }
    }

    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| TrainError::io(path, e))?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|source| TrainError::Serialize {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Deserializes a config from a JSON file previously written by `save_json`.
    pub fn load_json(path: &Path) -> Result<LoopConfig> {
        let file = std::fs::File::open(path).map_err(|e| TrainError::io(path, e))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|source| TrainError::Serialize {
            path: path.to_path_buf(),
            source,
        })
    }
}
