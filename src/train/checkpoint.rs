use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TrainError};
use crate::model::StateDict;

pub const LAST_CHECKPOINT: &str = "model_last.json";
pub const BEST_CHECKPOINT: &str = "model_best.json";

/// What gets persisted at the end of an epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Index of the next epoch to run.
    pub epoch: usize,
    pub model_state: StateDict,
    /// Lowest validation loss seen so far; `+inf` before the first epoch.
    #[serde(with = "non_finite_as_null")]
    pub best_metric: f64,
}

/// Which artifacts `CheckpointStore::save` writes. The three flags are
/// independent; any combination may fire for the same epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavePolicy {
    pub write_numbered: bool,
    pub write_last: bool,
    pub write_best: bool,
}

impl SavePolicy {
    pub fn any(&self) -> bool {
        self.write_numbered || self.write_last || self.write_best
    }
}

/// Named checkpoint a run can resume from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    Best,
    Last,
}

impl CheckpointKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            CheckpointKind::Best => BEST_CHECKPOINT,
            CheckpointKind::Last => LAST_CHECKPOINT,
        }
    }
}

/// A checkpoint as the training loop consumes it.
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub model_state: StateDict,
    pub best_metric: f64,
    /// Index of the last completed epoch (the stored "next epoch" minus one).
    pub epoch: usize,
}

/// Reads and writes checkpoint records in one output directory.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> CheckpointStore {
        CheckpointStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of the per-epoch snapshot for `epoch`.
    pub fn numbered_name(epoch: usize) -> String {
        format!("checkpoint{}.json", epoch)
    }

    pub fn path(&self, kind: CheckpointKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn save(&self, record: &CheckpointRecord, policy: SavePolicy, numbered_name: &str) -> Result<()> {
        if !policy.any() {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(record).map_err(|source| TrainError::Serialize {
            path: self.dir.join(numbered_name),
            source,
        })?;

        if policy.write_numbered {
            write_file(&self.dir.join(numbered_name), &bytes)?;
        }
        if policy.write_last {
            write_file(&self.path(CheckpointKind::Last), &bytes)?;
        }
        if policy.write_best {
            write_file(&self.path(CheckpointKind::Best), &bytes)?;
            info!(epoch = record.epoch, best_metric = record.best_metric, "saved new best checkpoint");
        }
        Ok(())
    }

    /// Loads a named checkpoint. Fails with `MissingCheckpoint` when the file
    /// is absent and `InvalidCheckpoint` when it records no completed epoch.
    pub fn load(&self, kind: CheckpointKind) -> Result<LoadedCheckpoint> {
        let path = self.path(kind);
        if !path.exists() {
            return Err(TrainError::MissingCheckpoint { path });
        }
        let record = read_record(&path)?;
        let Some(epoch) = record.epoch.checked_sub(1) else {
            return Err(TrainError::InvalidCheckpoint {
                path,
                reason: "stored epoch is 0; a saved checkpoint always follows a completed epoch".into(),
            });
        };
        info!(path = %path.display(), epoch = record.epoch, "loaded checkpoint");
        Ok(LoadedCheckpoint {
            model_state: record.model_state,
            best_metric: record.best_metric,
            epoch,
        })
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| TrainError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .and_then(|_| writer.flush())
        .map_err(|e| TrainError::io(path, e))?;
    debug!(path = %path.display(), "wrote checkpoint");
    Ok(())
}

fn read_record(path: &Path) -> Result<CheckpointRecord> {
    let file = fs::File::open(path).map_err(|e| TrainError::io(path, e))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|source| TrainError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

/// JSON has no infinity; store non-finite values as `null` and read `null`
/// back as `+inf`.
mod non_finite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            s.serialize_some(value)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}
