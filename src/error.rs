use std::path::PathBuf;

use thiserror::Error;

/// Boxed error raised by a collaborator (model, optimizer, data source).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every failure the training loop can surface.
///
/// Nothing here is recoverable inside an epoch: the loop stops at the first
/// error and the artifacts written by previous epochs stay the recovery point.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("choose to load only one model: last or best")]
    ConflictingResume,

    #[error("can't load model {}: no checkpoint at that path", path.display())]
    MissingCheckpoint { path: PathBuf },

    #[error("invalid checkpoint {}: {reason}", path.display())]
    InvalidCheckpoint { path: PathBuf, reason: String },

    #[error(
        "metrics history in {} has {history_rows} rows but the checkpoint resumes at epoch {checkpoint_epoch}",
        path.display()
    )]
    HistoryMismatch {
        path: PathBuf,
        checkpoint_epoch: usize,
        history_rows: usize,
    },

    #[error("{} has {score_rows} rows but the loss history has {loss_rows}", path.display())]
    ScoreRowsMismatch {
        path: PathBuf,
        loss_rows: usize,
        score_rows: usize,
    },

    #[error("{} has {found} columns, expected {expected}", path.display())]
    ColumnMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: line {line}: {message}", path.display())]
    Csv {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error(transparent)]
    Collaborator(#[from] BoxError),
}

impl TrainError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;
