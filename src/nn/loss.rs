use serde::{Serialize, Deserialize};

use crate::error::BoxError;
use crate::tensor::Tensor;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

/// Selects the loss an `Mlp` is trained against.
///
/// - `Mse`          — mean squared error over every output of the batch.
/// - `CrossEntropy` — categorical cross-entropy averaged over the batch;
///   pair with a Softmax output. Targets are either one value per sample
///   (a class index) or a full distribution per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    Mse,
    CrossEntropy,
}

impl LossType {
    /// Returns the scalar loss and its gradient with respect to the
    /// predictions (the logits, for Softmax + cross-entropy).
    pub fn value_and_grad(&self, predicted: &Tensor, target: &Tensor) -> Result<(f64, Vec<f64>), BoxError> {
        match self {
            LossType::Mse => mse(predicted, target),
            LossType::CrossEntropy => cross_entropy(predicted, target),
        }
    }
}

fn mse(predicted: &Tensor, target: &Tensor) -> Result<(f64, Vec<f64>), BoxError> {
    if predicted.numel() != target.numel() {
        return Err(format!(
            "mse: {} predictions but {} targets",
            predicted.numel(),
            target.numel()
        )
        .into());
    }
    let n = predicted.numel().max(1) as f64;
    let diff: Vec<f64> = predicted.data.iter().zip(&target.data).map(|(p, e)| p - e).collect();
    let loss = diff.iter().map(|d| d * d).sum::<f64>() / n;
    let grad = diff.into_iter().map(|d| 2.0 * d / n).collect();
    Ok((loss, grad))
}

fn cross_entropy(predicted: &Tensor, target: &Tensor) -> Result<(f64, Vec<f64>), BoxError> {
    let batch = predicted.batch_size();
    let classes = predicted.row_len();
    if target.batch_size() != batch {
        return Err(format!(
            "cross_entropy: {} predictions but {} targets",
            batch,
            target.batch_size()
        )
        .into());
    }

    let mut loss = 0.0;
    let mut grad = Vec::with_capacity(predicted.numel());
    for b in 0..batch {
        let expected = expected_distribution(target.row(b), classes)?;
        for (p, e) in predicted.row(b).iter().zip(&expected) {
            loss -= e * (p + EPS).ln();
            grad.push((p - e) / batch as f64);
        }
    }
    Ok((loss / batch.max(1) as f64, grad))
}

/// Expands a class-index target to one-hot; passes distributions through.
fn expected_distribution(row: &[f64], classes: usize) -> Result<Vec<f64>, BoxError> {
    if row.len() == classes {
        return Ok(row.to_vec());
    }
    if row.len() != 1 {
        return Err(format!("cross_entropy: target row of {} values for {} classes", row.len(), classes).into());
    }
    let idx = row[0];
    if idx < 0.0 || idx.fract() != 0.0 || idx as usize >= classes {
        return Err(format!("cross_entropy: class index {} out of range 0..{}", idx, classes).into());
    }
    let mut one_hot = vec![0.0; classes];
    one_hot[idx as usize] = 1.0;
    Ok(one_hot)
}
