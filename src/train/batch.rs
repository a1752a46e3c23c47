use std::any::Any;

use tracing::trace;

use crate::callbacks::Callbacks;
use crate::error::{BoxError, Result};
use crate::model::Model;
use crate::optim::Optimizer;
use crate::tensor::{Backend, Tensor, Tensors};

/// Everything one minibatch produced.
pub struct BatchOutput {
    pub predictions: Vec<Tensor>,
    pub loss: f64,
    /// One value per score callback, in registration order.
    pub scores: Vec<f64>,
    /// One `on_batch` result per batch callback, in registration order.
    pub callback_results: Vec<Box<dyn Any>>,
    /// Leading dimension of the first input tensor.
    pub batch_size: usize,
}

/// Runs a single minibatch through the model and, when training, the optimizer.
pub struct BatchProcessor<'a, M, O> {
    pub(crate) model: &'a mut M,
    pub(crate) optimizer: &'a mut O,
    pub(crate) callbacks: &'a mut Callbacks,
    pub(crate) backend: Backend,
}

impl<'a, M, O> BatchProcessor<'a, M, O>
where
    M: Model,
    O: Optimizer<M>,
{
    pub fn new(
        model: &'a mut M,
        optimizer: &'a mut O,
        callbacks: &'a mut Callbacks,
        backend: Backend,
    ) -> Self {
        BatchProcessor { model, optimizer, callbacks, backend }
    }

    /// Forward, loss, and (unless `is_eval`) zero_grad → backward → step.
    ///
    /// Score callbacks see the targets exactly as the data source yielded
    /// them; the model's loss sees the backend-converted targets. Any
    /// collaborator error is returned as is and aborts the batch.
    pub fn process(&mut self, raw_input: Tensors, raw_target: Tensors, is_eval: bool) -> Result<BatchOutput> {
        let raw_inputs = raw_input.into_vec();
        let raw_targets = raw_target.into_vec();
        let batch_size = raw_inputs.first().map(Tensor::batch_size).unwrap_or(0);

        let (inputs, targets) = self.backend.prepare(raw_inputs, raw_targets.clone());
        let inputs: Vec<Tensor> = inputs
            .into_iter()
            .map(|t| t.with_requires_grad(!is_eval))
            .collect();
        let targets: Vec<Tensor> = targets
            .into_iter()
            .map(|t| t.with_requires_grad(!is_eval))
            .collect();

        let predictions = self.model.forward(&inputs)?.into_vec();
        let loss = self.model.loss(&predictions, &targets)?;

        if !is_eval {
            self.optimizer.zero_grad(self.model);
            self.model.backward()?;
            self.optimizer.step(self.model)?;
        }

        let scores: Vec<f64> = self
            .callbacks
            .score
            .iter_mut()
            .map(|score| score(&predictions, &raw_targets))
            .collect::<std::result::Result<_, BoxError>>()?;

        let callback_results: Vec<Box<dyn Any>> = self
            .callbacks
            .batch
            .iter_mut()
            .map(|cb| cb.on_batch_any(&predictions, &inputs, &raw_targets, is_eval))
            .collect::<std::result::Result<_, BoxError>>()?;

        trace!(batch_size, loss, is_eval, "processed batch");

        Ok(BatchOutput { predictions, loss, scores, callback_results, batch_size })
    }
}
