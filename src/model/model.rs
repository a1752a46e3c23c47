use std::collections::BTreeMap;

use crate::error::BoxError;
use crate::tensor::{Backend, Tensor, Tensors};

/// Serializable snapshot of a model's parameters, keyed by parameter name.
pub type StateDict = BTreeMap<String, Tensor>;

/// A trainable tensor together with its accumulated gradient.
///
/// `grad` has the same length as `value.data`. `Model::backward` adds into
/// it; only an optimizer's `zero_grad` clears it.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub value: Tensor,
    pub grad: Vec<f64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Tensor) -> Parameter {
        let grad = vec![0.0; value.numel()];
        Parameter { name: name.into(), value, grad }
    }

    pub fn zero_grad(&mut self) {
        self.grad.iter_mut().for_each(|g| *g = 0.0);
    }
}

/// The model collaborator driven by the training loop.
///
/// The loop never looks inside a model: it feeds converted inputs to
/// `forward`, asks `loss` for a scalar, and in training mode calls `backward`
/// to accumulate gradients into the parameters exposed by `parameters_mut`.
pub trait Model {
    /// Runs the forward pass. A model with one output may return a single tensor.
    fn forward(&mut self, inputs: &[Tensor]) -> Result<Tensors, BoxError>;

    /// Scalar loss of the last forward pass against `targets`.
    fn loss(&mut self, predictions: &[Tensor], targets: &[Tensor]) -> Result<f64, BoxError>;

    /// Backpropagates the loss computed by the last `loss` call, adding into
    /// each parameter's gradient.
    fn backward(&mut self) -> Result<(), BoxError>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    fn state_dict(&self) -> StateDict;

    fn load_state_dict(&mut self, state: StateDict) -> Result<(), BoxError>;

    /// Switches to training mode.
    fn train(&mut self);

    /// Switches to evaluation mode.
    fn eval(&mut self);

    /// Called once when the model is handed to a `TrainLoop`.
    fn to_backend(&mut self, _backend: Backend) {}
}
