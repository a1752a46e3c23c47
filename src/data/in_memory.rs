use rand::seq::SliceRandom;

use crate::data::source::{Batch, DataSource};
use crate::error::{BoxError, Result, TrainError};
use crate::tensor::Tensor;

/// Samples held in memory and cut into `[batch, features]` tensors.
///
/// With shuffling enabled the sample order is re-drawn at the start of every
/// pass; the last batch may be smaller than `batch_size`.
pub struct InMemoryDataset {
    inputs: Vec<Vec<f64>>,
    labels: Vec<Vec<f64>>,
    batch_size: usize,
    shuffle: bool,
}

impl InMemoryDataset {
    pub fn new(inputs: Vec<Vec<f64>>, labels: Vec<Vec<f64>>, batch_size: usize) -> Result<InMemoryDataset> {
        if inputs.len() != labels.len() {
            return Err(TrainError::ShapeMismatch(format!(
                "{} input samples but {} labels",
                inputs.len(),
                labels.len()
            )));
        }
        if batch_size == 0 {
            return Err(TrainError::ShapeMismatch("batch_size must be at least 1".into()));
        }
        Ok(InMemoryDataset { inputs, labels, batch_size, shuffle: false })
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> InMemoryDataset {
        self.shuffle = shuffle;
        self
    }

    pub fn num_samples(&self) -> usize {
        self.inputs.len()
    }

    fn gather(&self, indices: &[usize]) -> std::result::Result<Batch, BoxError> {
        let x = Tensor::from_rows(indices.iter().map(|&i| self.inputs[i].clone()).collect())?;
        let y = Tensor::from_rows(indices.iter().map(|&i| self.labels[i].clone()).collect())?;
        Ok((x.into(), y.into()))
    }
}

impl DataSource for InMemoryDataset {
    fn len(&self) -> usize {
        self.inputs.len().div_ceil(self.batch_size)
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = std::result::Result<Batch, BoxError>> + '_> {
        let mut order: Vec<usize> = (0..self.inputs.len()).collect();
        if self.shuffle {
            order.shuffle(&mut rand::thread_rng());
        }
        let this = &*self;
        let chunks: Vec<Vec<usize>> = order.chunks(self.batch_size).map(<[usize]>::to_vec).collect();
        Box::new(chunks.into_iter().map(move |idx| this.gather(&idx)))
    }
}
