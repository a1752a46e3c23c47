use rand::Rng;

use crate::error::BoxError;
use crate::model::Parameter;
use crate::nn::activation::Activation;
use crate::tensor::Tensor;

/// Values kept from the last training-mode forward pass for backprop.
#[derive(Debug, Clone)]
struct ForwardCache {
    input: Vec<f64>,
    z: Vec<f64>,
    a: Vec<f64>,
    batch: usize,
}

/// Fully connected layer: `a = act(x · W + b)`.
///
/// `weights` has shape `[input_size, size]`, `biases` shape `[size]`.
#[derive(Debug, Clone)]
pub struct Dense {
    pub weights: Parameter,
    pub biases: Parameter,
    pub activation: Activation,
    cache: Option<ForwardCache>,
}

impl Dense {
    /// Uniform Glorot initialisation (He for ReLU-family layers), zero biases.
    pub fn new<R: Rng>(
        name: &str,
        size: usize,
        input_size: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Dense {
        let limit = match activation {
            Activation::ReLU | Activation::LeakyReLU { .. } => (6.0 / input_size as f64).sqrt(),
            _ => (6.0 / (input_size + size) as f64).sqrt(),
        };
        let w: Vec<f64> = (0..input_size * size).map(|_| rng.gen_range(-limit..=limit)).collect();
        let weights = Tensor { data: w, ..Tensor::zeros(vec![input_size, size]) };

        Dense {
            weights: Parameter::new(format!("{}.weight", name), weights),
            biases: Parameter::new(format!("{}.bias", name), Tensor::zeros(vec![size])),
            activation,
            cache: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.value.shape[0]
    }

    pub fn size(&self) -> usize {
        self.weights.value.shape[1]
    }

    /// Forward pass over `batch` row-major samples. With `keep` set the
    /// intermediate values are cached for `backward`; otherwise any previous
    /// cache is dropped.
    pub fn forward(&mut self, input: &[f64], batch: usize, keep: bool) -> Vec<f64> {
        let (n_in, n_out) = (self.input_size(), self.size());
        let w = &self.weights.value.data;
        let mut z = Vec::with_capacity(batch * n_out);
        for x in input.chunks(n_in).take(batch) {
            let mut row = self.biases.value.data.clone();
            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                for (zj, wij) in row.iter_mut().zip(&w[i * n_out..(i + 1) * n_out]) {
                    *zj += xi * wij;
                }
            }
            z.extend(row);
        }
        let a: Vec<f64> = z.chunks(n_out).flat_map(|row| self.activation.apply(row)).collect();

        self.cache = if keep {
            Some(ForwardCache { input: input.to_vec(), z, a: a.clone(), batch })
        } else {
            None
        };
        a
    }

    /// Accumulates ∂L/∂W and ∂L/∂b from `grad_out` (∂L/∂a of this layer) and
    /// returns ∂L/∂x for the layer below.
    pub fn backward(&mut self, grad_out: &[f64]) -> Result<Vec<f64>, BoxError> {
        let (n_in, n_out) = (self.input_size(), self.size());
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| format!("{}: backward without a cached forward pass", self.weights.name))?;

        let delta: Vec<f64> = grad_out
            .iter()
            .zip(cache.z.iter().zip(&cache.a))
            .map(|(g, (&z, &a))| g * self.activation.derivative(z, a))
            .collect();

        let w = &self.weights.value.data;
        let mut grad_in = vec![0.0; cache.batch * n_in];
        for b in 0..cache.batch {
            let x = &cache.input[b * n_in..(b + 1) * n_in];
            let d = &delta[b * n_out..(b + 1) * n_out];
            for (bg, dj) in self.biases.grad.iter_mut().zip(d) {
                *bg += dj;
            }
            for i in 0..n_in {
                let w_row = &w[i * n_out..(i + 1) * n_out];
                let g_row = &mut self.weights.grad[i * n_out..(i + 1) * n_out];
                let mut acc = 0.0;
                for j in 0..n_out {
                    g_row[j] += x[i] * d[j];
                    acc += d[j] * w_row[j];
                }
                grad_in[b * n_in + i] = acc;
            }
        }
        Ok(grad_in)
    }
}
