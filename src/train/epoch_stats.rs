use serde::{Serialize, Deserialize};

/// Averaged statistics of one training or validation pass.
///
/// Every registered epoch callback receives one `EpochStats` at the end of
/// each pass, after the batch callbacks have been flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// Mean loss, weighted by batch sample count.
    pub loss: f64,
    /// Mean seconds spent waiting for the data source per batch.
    pub data_time: f64,
    /// Mean wall-clock seconds per batch, data wait included.
    pub batch_time: f64,
    /// One mean per score callback, in registration order.
    pub scores: Vec<f64>,
    /// `true` for the training pass, `false` for validation.
    pub is_training: bool,
}
