pub mod activation;
pub mod dense;
pub mod loss;
pub mod mlp;

pub use activation::Activation;
pub use dense::Dense;
pub use loss::LossType;
pub use mlp::Mlp;
