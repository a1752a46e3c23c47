use serde::{Deserialize, Serialize};

use crate::tensor::tensor::{DType, Device, Tensor};

/// Execution backend a batch is converted to before the forward pass.
///
/// - `Cpu`            — inputs are cast to `F64`, targets to integral `I64`.
/// - `Accelerator(n)` — every tensor is moved to device `n`; dtypes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Cpu,
    Accelerator(usize),
}

impl Backend {
    pub fn device(&self) -> Device {
        match self {
            Backend::Cpu => Device::Cpu,
            Backend::Accelerator(id) => Device::Accelerator(*id),
        }
    }

    /// Converts a normalized (inputs, targets) pair for this backend.
    pub fn prepare(&self, inputs: Vec<Tensor>, targets: Vec<Tensor>) -> (Vec<Tensor>, Vec<Tensor>) {
        match self {
            Backend::Cpu => (
                inputs.into_iter().map(|t| t.to_dtype(DType::F64)).collect(),
                targets.into_iter().map(|t| t.to_dtype(DType::I64)).collect(),
            ),
            Backend::Accelerator(_) => {
                let device = self.device();
                (
                    inputs.into_iter().map(|t| t.to_device(device)).collect(),
                    targets.into_iter().map(|t| t.to_device(device)).collect(),
                )
            }
        }
    }
}
