use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    Sigmoid,
    ReLU,
    Identity,
    Tanh,
    LeakyReLU { alpha: f64 },
    /// Row-wise softmax. Its backward pass is the identity: it is meant to be
    /// paired with cross-entropy, whose gradient is already taken with
    /// respect to the logits.
    Softmax,
}

impl Activation {
    /// Applies the activation to one sample's pre-activations.
    pub fn apply(&self, z: &[f64]) -> Vec<f64> {
        match self {
            Activation::Softmax => {
                let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let exps: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
                let sum: f64 = exps.iter().sum();
                exps.into_iter().map(|e| e / sum).collect()
            }
            _ => z.iter().map(|&x| self.scalar(x)).collect(),
        }
    }

    fn scalar(&self, x: f64) -> f64 {
        match self {
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::ReLU => x.max(0.0),
            Activation::Identity | Activation::Softmax => x,
            Activation::Tanh => x.tanh(),
            Activation::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
        }
    }

    /// ∂a/∂z given the pre-activation `z` and the activation output `a`.
    pub fn derivative(&self, z: f64, a: f64) -> f64 {
        match self {
            Activation::Sigmoid => a * (1.0 - a),
            Activation::ReLU => if z > 0.0 { 1.0 } else { 0.0 },
            Activation::Identity | Activation::Softmax => 1.0,
            Activation::Tanh => 1.0 - a * a,
            Activation::LeakyReLU { alpha } => if z > 0.0 { 1.0 } else { *alpha },
        }
    }
}
