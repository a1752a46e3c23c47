use crate::error::BoxError;
use crate::tensor::Tensors;

/// One minibatch: (inputs, targets).
pub type Batch = (Tensors, Tensors);

/// A finite, ordered, restartable sequence of minibatches.
///
/// `batches` is called once per epoch and must start again from the
/// beginning each time.
pub trait DataSource {
    /// Number of batches one pass yields.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch, BoxError>> + '_>;
}

/// A pre-built list of batches, replayed in order on every pass.
impl DataSource for Vec<Batch> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch, BoxError>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}
