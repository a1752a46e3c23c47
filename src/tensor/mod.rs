pub mod tensor;
pub mod backend;

pub use tensor::{DType, Device, Tensor, Tensors};
pub use backend::Backend;
