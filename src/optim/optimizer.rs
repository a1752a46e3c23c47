use crate::error::BoxError;
use crate::model::Model;

/// The optimizer collaborator: clears and consumes the gradients that
/// `Model::backward` accumulates.
pub trait Optimizer<M: Model + ?Sized> {
    fn zero_grad(&mut self, model: &mut M);

    fn step(&mut self, model: &mut M) -> Result<(), BoxError>;
}
