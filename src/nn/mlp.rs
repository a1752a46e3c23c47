use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{BoxError, Result, TrainError};
use crate::model::{Model, Parameter, StateDict};
use crate::nn::activation::Activation;
use crate::nn::dense::Dense;
use crate::nn::loss::LossType;
use crate::tensor::{Tensor, Tensors};

/// A stack of dense layers trained against one `LossType`.
///
/// Takes a single `[batch, input_size]` input tensor and returns a single
/// `[batch, output_size]` prediction. In training mode `loss` remembers the
/// output gradient so the following `backward` can push it through the
/// layers; in eval mode nothing is cached.
pub struct Mlp {
    layers: Vec<Dense>,
    loss_type: LossType,
    training: bool,
    output_grad: Option<Vec<f64>>,
}

impl Mlp {
    /// Builds a network from (size, input_size, activation) tuples.
    pub fn new(layer_specs: Vec<(usize, usize, Activation)>, loss_type: LossType) -> Result<Mlp> {
        Mlp::build(layer_specs, loss_type, &mut rand::thread_rng())
    }

    /// Like `new`, with a reproducible initialisation.
    pub fn seeded(layer_specs: Vec<(usize, usize, Activation)>, loss_type: LossType, seed: u64) -> Result<Mlp> {
        Mlp::build(layer_specs, loss_type, &mut StdRng::seed_from_u64(seed))
    }

    fn build<R: Rng>(
        layer_specs: Vec<(usize, usize, Activation)>,
        loss_type: LossType,
        rng: &mut R,
    ) -> Result<Mlp> {
        if layer_specs.is_empty() {
            return Err(TrainError::ShapeMismatch("an Mlp needs at least one layer".into()));
        }
        let mut layers = Vec::with_capacity(layer_specs.len());
        for (i, &(size, input_size, activation)) in layer_specs.iter().enumerate() {
            if size == 0 || input_size == 0 {
                return Err(TrainError::ShapeMismatch(format!("layer {} has a zero dimension", i)));
            }
            if i > 0 && layer_specs[i - 1].0 != input_size {
                return Err(TrainError::ShapeMismatch(format!(
                    "layer {} expects {} inputs but layer {} has {} neurons",
                    i,
                    input_size,
                    i - 1,
                    layer_specs[i - 1].0
                )));
            }
            layers.push(Dense::new(&format!("layers.{}", i), size, input_size, activation, rng));
        }
        Ok(Mlp { layers, loss_type, training: true, output_grad: None })
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].size()
    }

    pub fn loss_type(&self) -> LossType {
        self.loss_type
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    fn run(&mut self, input: &Tensor) -> std::result::Result<Tensor, BoxError> {
        if input.row_len() != self.input_size() {
            return Err(format!(
                "Mlp expects {} features per sample, got {}",
                self.input_size(),
                input.row_len()
            )
            .into());
        }
        let batch = input.batch_size();
        let keep = self.training;
        let mut current = input.data.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current, batch, keep);
        }
        let out = Tensor::new(vec![batch, self.output_size()], current)?;
        Ok(out.to_device(input.device))
    }
}

impl Model for Mlp {
    fn forward(&mut self, inputs: &[Tensor]) -> std::result::Result<Tensors, BoxError> {
        let input = inputs.first().ok_or("Mlp::forward needs one input tensor")?;
        Ok(self.run(input)?.into())
    }

    fn loss(&mut self, predictions: &[Tensor], targets: &[Tensor]) -> std::result::Result<f64, BoxError> {
        let predicted = predictions.first().ok_or("Mlp::loss needs a prediction")?;
        let target = targets.first().ok_or("Mlp::loss needs a target")?;
        let (loss, grad) = self.loss_type.value_and_grad(predicted, target)?;
        self.output_grad = if self.training { Some(grad) } else { None };
        Ok(loss)
    }

    fn backward(&mut self) -> std::result::Result<(), BoxError> {
        let mut grad = self
            .output_grad
            .take()
            .ok_or("Mlp::backward called without a training-mode loss")?;
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.layers
            .iter_mut()
            .flat_map(|l| [&mut l.weights, &mut l.biases])
            .collect()
    }

    fn state_dict(&self) -> StateDict {
        self.layers
            .iter()
            .flat_map(|l| [&l.weights, &l.biases])
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    fn load_state_dict(&mut self, mut state: StateDict) -> std::result::Result<(), BoxError> {
        for param in self.parameters_mut() {
            let value = state
                .remove(&param.name)
                .ok_or_else(|| format!("state dict has no '{}'", param.name))?;
            if value.shape != param.value.shape {
                return Err(format!(
                    "'{}' has shape {:?} in the state dict, model expects {:?}",
                    param.name, value.shape, param.value.shape
                )
                .into());
            }
            param.value.data = value.data;
        }
        if let Some(extra) = state.keys().next() {
            return Err(format!("state dict has unexpected parameter '{}'", extra).into());
        }
        Ok(())
    }

    fn train(&mut self) {
        self.training = true;
    }

    fn eval(&mut self) {
        self.training = false;
        self.output_grad = None;
    }
}
