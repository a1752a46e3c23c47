use std::collections::HashMap;

use crate::error::BoxError;
use crate::model::Model;
use crate::optim::optimizer::Optimizer;

/// Stochastic gradient descent with optional classical momentum.
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    velocity: HashMap<String, Vec<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate, momentum: 0.0, velocity: HashMap::new() }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Sgd {
        self.momentum = momentum;
        self
    }
}

impl<M: Model + ?Sized> Optimizer<M> for Sgd {
    fn zero_grad(&mut self, model: &mut M) {
        for param in model.parameters_mut() {
            param.zero_grad();
        }
    }

    /// `v = momentum * v + grad; value -= lr * v`. With zero momentum this is
    /// plain `value -= lr * grad`.
    fn step(&mut self, model: &mut M) -> Result<(), BoxError> {
        for param in model.parameters_mut() {
            if param.grad.len() != param.value.data.len() {
                return Err(format!(
                    "parameter '{}' has {} gradients for {} values",
                    param.name,
                    param.grad.len(),
                    param.value.data.len()
                )
                .into());
            }
            if self.momentum == 0.0 {
                for (w, g) in param.value.data.iter_mut().zip(&param.grad) {
                    *w -= self.learning_rate * g;
                }
                continue;
            }
            let v = self
                .velocity
                .entry(param.name.clone())
                .or_insert_with(|| vec![0.0; param.grad.len()]);
            for ((w, g), v) in param.value.data.iter_mut().zip(&param.grad).zip(v.iter_mut()) {
                *v = self.momentum * *v + g;
                *w -= self.learning_rate * *v;
            }
        }
        Ok(())
    }
}
