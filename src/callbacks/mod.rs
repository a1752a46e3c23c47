pub mod registry;

pub use registry::{AnyBatchCallback, BatchCallback, Callbacks, EpochFn, ScoreFn};
