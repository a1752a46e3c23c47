//! Ready-made score callbacks. Each has the
//! `(predictions, targets) -> Result<f64, BoxError>` shape expected by
//! `TrainLoop::add_score_callback`.

use crate::error::BoxError;
use crate::tensor::Tensor;

/// Fraction of samples whose highest-scoring output matches the target.
///
/// Targets may be one class index per sample or one row of scores per sample
/// (one-hot or soft labels; argmax is compared).
pub fn accuracy(predictions: &[Tensor], targets: &[Tensor]) -> Result<f64, BoxError> {
    let (Some(pred), Some(target)) = (predictions.first(), targets.first()) else {
        return Ok(0.0);
    };
    if pred.batch_size() != target.batch_size() {
        return Err(format!(
            "accuracy: {} predictions for {} targets",
            pred.batch_size(),
            target.batch_size()
        )
        .into());
    }
    let n = pred.batch_size();
    if n == 0 {
        return Ok(0.0);
    }
    let correct = (0..n)
        .filter(|&b| {
            let expected = match target.row(b) {
                [class] if pred.row_len() > 1 => *class as usize,
                row => argmax(row),
            };
            argmax(pred.row(b)) == expected
        })
        .count();
    Ok(correct as f64 / n as f64)
}

/// Mean absolute difference between the first prediction and first target.
pub fn mean_absolute_error(predictions: &[Tensor], targets: &[Tensor]) -> Result<f64, BoxError> {
    let (Some(pred), Some(target)) = (predictions.first(), targets.first()) else {
        return Ok(0.0);
    };
    if pred.numel() != target.numel() {
        return Err(format!("mean_absolute_error: {} predictions for {} targets", pred.numel(), target.numel()).into());
    }
    let n = pred.numel();
    if n == 0 {
        return Ok(0.0);
    }
    Ok(pred.data.iter().zip(&target.data).map(|(p, t)| (p - t).abs()).sum::<f64>() / n as f64)
}

/// Index of the maximum element in a slice.
fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
