pub mod error;
pub mod tensor;
pub mod model;
pub mod optim;
pub mod data;
pub mod callbacks;
pub mod train;
pub mod nn;
pub mod scores;

#[cfg(test)]
mod testing;

// Convenience re-exports
pub use error::{BoxError, Result, TrainError};
pub use tensor::{Backend, DType, Device, Tensor, Tensors};
pub use model::{Model, Parameter, StateDict};
pub use optim::{Optimizer, Sgd};
pub use data::{Batch, DataSource, InMemoryDataset};
pub use callbacks::{BatchCallback, Callbacks};
pub use train::{
    CheckpointKind, CheckpointStore, EpochStats, LoopConfig, LoopOutcome, MetricsHistory,
    RunningAverage, TrainLoop,
};
pub use nn::{Activation, LossType, Mlp};
