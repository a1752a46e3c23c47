pub mod source;
pub mod in_memory;

pub use source::{Batch, DataSource};
pub use in_memory::InMemoryDataset;
