use std::any::Any;

use crate::error::BoxError;
use crate::tensor::Tensor;
use crate::train::epoch_stats::EpochStats;

/// Computes a scalar quality metric from a batch's predictions and its
/// targets as the data source yielded them. An error aborts the pass.
pub type ScoreFn = Box<dyn FnMut(&[Tensor], &[Tensor]) -> Result<f64, BoxError>>;

/// Receives the averaged statistics of every finished training or
/// validation pass.
pub type EpochFn = Box<dyn FnMut(&EpochStats) -> Result<(), BoxError>>;

/// A per-batch hook whose results are buffered for the whole pass and handed
/// back in one piece when the pass ends.
pub trait BatchCallback {
    type Item: 'static;

    fn on_batch(
        &mut self,
        predictions: &[Tensor],
        inputs: &[Tensor],
        targets: &[Tensor],
        is_eval: bool,
    ) -> Result<Self::Item, BoxError>;

    /// `items` holds one `on_batch` result per batch, in batch order.
    fn on_epoch(&mut self, items: Vec<Self::Item>, is_eval: bool) -> Result<(), BoxError>;
}

/// Object-safe view of a `BatchCallback`, letting callbacks with different
/// `Item` types share one registry.
pub trait AnyBatchCallback {
    fn on_batch_any(
        &mut self,
        predictions: &[Tensor],
        inputs: &[Tensor],
        targets: &[Tensor],
        is_eval: bool,
    ) -> Result<Box<dyn Any>, BoxError>;

    fn on_epoch_any(&mut self, items: Vec<Box<dyn Any>>, is_eval: bool) -> Result<(), BoxError>;
}

impl<C: BatchCallback> AnyBatchCallback for C {
    fn on_batch_any(
        &mut self,
        predictions: &[Tensor],
        inputs: &[Tensor],
        targets: &[Tensor],
        is_eval: bool,
    ) -> Result<Box<dyn Any>, BoxError> {
        let item = self.on_batch(predictions, inputs, targets, is_eval)?;
        Ok(Box::new(item))
    }

    fn on_epoch_any(&mut self, items: Vec<Box<dyn Any>>, is_eval: bool) -> Result<(), BoxError> {
        // Every item came out of `on_batch_any` on this same callback.
        let items = items
            .into_iter()
            .filter_map(|item| item.downcast::<C::Item>().ok())
            .map(|item| *item)
            .collect();
        self.on_epoch(items, is_eval)
    }
}

/// The three ordered extension points of a training loop.
///
/// Callbacks are registered before the loop starts and invoked in
/// registration order.
#[derive(Default)]
pub struct Callbacks {
    pub(crate) score: Vec<ScoreFn>,
    pub(crate) batch: Vec<Box<dyn AnyBatchCallback>>,
    pub(crate) epoch: Vec<EpochFn>,
}

impl Callbacks {
    pub fn new() -> Callbacks {
        Callbacks::default()
    }

    pub fn add_score<F>(&mut self, f: F)
    where
        F: FnMut(&[Tensor], &[Tensor]) -> Result<f64, BoxError> + 'static,
    {
        self.score.push(Box::new(f));
    }

    pub fn extend_scores<I>(&mut self, fs: I)
    where
        I: IntoIterator<Item = ScoreFn>,
    {
        self.score.extend(fs);
    }

    pub fn add_batch<C>(&mut self, callback: C)
    where
        C: BatchCallback + 'static,
    {
        self.batch.push(Box::new(callback));
    }

    pub fn add_epoch<F>(&mut self, f: F)
    where
        F: FnMut(&EpochStats) -> Result<(), BoxError> + 'static,
    {
        self.epoch.push(Box::new(f));
    }

    pub fn score_count(&self) -> usize {
        self.score.len()
    }

    pub fn batch_count(&self) -> usize {
        self.batch.len()
    }

    pub fn epoch_count(&self) -> usize {
        self.epoch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Collect {
        flushed: Rc<RefCell<Vec<(Vec<usize>, bool)>>>,
    }

    impl BatchCallback for Collect {
        type Item = usize;

        fn on_batch(&mut self, predictions: &[Tensor], _: &[Tensor], _: &[Tensor], _: bool) -> Result<usize, BoxError> {
            Ok(predictions[0].batch_size())
        }

        fn on_epoch(&mut self, items: Vec<usize>, is_eval: bool) -> Result<(), BoxError> {
            self.flushed.borrow_mut().push((items, is_eval));
            Ok(())
        }
    }

    #[test]
    fn erased_callback_round_trips_its_items() {
        let flushed = Rc::new(RefCell::new(Vec::new()));
        let mut cbs = Callbacks::new();
        cbs.add_batch(Collect { flushed: flushed.clone() });

        let t = Tensor::zeros(vec![3, 1]);
        let item = cbs.batch[0].on_batch_any(&[t.clone()], &[t.clone()], &[t], true).unwrap();
        cbs.batch[0].on_epoch_any(vec![item], true).unwrap();

        assert_eq!(*flushed.borrow(), vec![(vec![3], true)]);
    }

    #[test]
    fn registries_keep_registration_order() {
        let mut cbs = Callbacks::new();
        cbs.add_score(|_, _| Ok(1.0));
        cbs.add_score(|_, _| Ok(2.0));
        let got: Vec<f64> = cbs.score.iter_mut().map(|f| f(&[], &[]).unwrap()).collect();
        assert_eq!(got, vec![1.0, 2.0]);
        assert_eq!(cbs.score_count(), 2);
        assert_eq!(cbs.batch_count(), 0);

        cbs.add_epoch(|_| Ok(()));
        assert_eq!(cbs.epoch_count(), 1);
    }
}
