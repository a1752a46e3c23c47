pub mod running_average;
pub mod epoch_stats;
pub mod batch;
pub mod epoch;
pub mod checkpoint;
pub mod history;
pub mod loop_config;
pub mod controller;

pub use running_average::RunningAverage;
pub use epoch_stats::EpochStats;
pub use batch::{BatchOutput, BatchProcessor};
pub use epoch::{EpochResult, EpochRunner};
pub use checkpoint::{CheckpointKind, CheckpointRecord, CheckpointStore, LoadedCheckpoint, SavePolicy};
pub use history::{MetricsHistory, MetricsTable};
pub use loop_config::LoopConfig;
pub use controller::{update_best, LoopOutcome, TrainLoop};
