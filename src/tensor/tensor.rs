use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// Numeric type convention of a tensor.
///
/// Values are always stored as `f64`; `I64` marks integral data (class
/// indices and the like) whose values have been truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    #[default]
    F64,
    I64,
}

/// Where a tensor lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
    Accelerator(usize),
}

/// A dense, row-major n-dimensional array.
///
/// The leading dimension is the batch dimension: `shape[0]` is the number of
/// samples a batch tensor carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
    #[serde(default)]
    pub dtype: DType,
    #[serde(skip)]
    pub device: Device,
    #[serde(skip)]
    pub requires_grad: bool,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Tensor> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TrainError::ShapeMismatch(format!(
                "shape {:?} needs {} values, got {}",
                shape, expected, data.len()
            )));
        }
        Ok(Tensor {
            shape,
            data,
            dtype: DType::F64,
            device: Device::Cpu,
            requires_grad: false,
        })
    }

    pub fn zeros(shape: Vec<usize>) -> Tensor {
        let n = shape.iter().product();
        Tensor {
            shape,
            data: vec![0.0; n],
            dtype: DType::F64,
            device: Device::Cpu,
            requires_grad: false,
        }
    }

    pub fn scalar(value: f64) -> Tensor {
        Tensor {
            shape: Vec::new(),
            data: vec![value],
            dtype: DType::F64,
            device: Device::Cpu,
            requires_grad: false,
        }
    }

    /// Builds a `[rows, cols]` tensor from equally sized rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Tensor> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
            return Err(TrainError::ShapeMismatch(format!(
                "row {} has {} values, expected {}",
                bad, rows[bad].len(), cols
            )));
        }
        let shape = vec![rows.len(), cols];
        Tensor::new(shape, rows.into_iter().flatten().collect())
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Number of samples along the leading dimension; a 0-d tensor counts as one.
    pub fn batch_size(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of values per sample.
    pub fn row_len(&self) -> usize {
        match self.batch_size() {
            0 => 0,
            n => self.numel() / n,
        }
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let w = self.row_len();
        &self.data[i * w..(i + 1) * w]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        let w = self.row_len().max(1);
        self.data.chunks(w)
    }

    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            ..self.clone()
        }
    }

    /// Casts to `dtype`. Converting to `I64` truncates every value toward zero.
    pub fn to_dtype(mut self, dtype: DType) -> Tensor {
        if dtype == DType::I64 && self.dtype != DType::I64 {
            self.data.iter_mut().for_each(|x| *x = x.trunc());
        }
        self.dtype = dtype;
        self
    }

    pub fn to_device(mut self, device: Device) -> Tensor {
        self.device = device;
        self
    }

    pub fn with_requires_grad(mut self, requires_grad: bool) -> Tensor {
        self.requires_grad = requires_grad;
        self
    }
}

/// Either one tensor or an ordered list of tensors.
///
/// Models and data sources may hand back whichever is natural for them; the
/// training loop always works on the list form.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensors {
    Single(Tensor),
    List(Vec<Tensor>),
}

impl Tensors {
    pub fn into_vec(self) -> Vec<Tensor> {
        match self {
            Tensors::Single(t) => vec![t],
            Tensors::List(ts) => ts,
        }
    }
}

impl From<Tensor> for Tensors {
    fn from(t: Tensor) -> Self {
        Tensors::Single(t)
    }
}

impl From<Vec<Tensor>> for Tensors {
    fn from(ts: Vec<Tensor>) -> Self {
        Tensors::List(ts)
    }
}
