use std::time::Instant;

use tracing::{debug, trace};

use crate::data::DataSource;
use crate::error::Result;
use crate::model::Model;
use crate::optim::Optimizer;
use crate::train::batch::BatchProcessor;
use crate::train::epoch_stats::EpochStats;
use crate::train::running_average::RunningAverage;

/// Accumulated averages of one full pass over a data source.
#[derive(Debug, Clone)]
pub struct EpochResult {
    pub loss: RunningAverage,
    /// One average per score callback, in registration order.
    pub scores: Vec<RunningAverage>,
    pub data_time: RunningAverage,
    pub batch_time: RunningAverage,
    pub batches: usize,
}

impl EpochResult {
    pub fn score_averages(&self) -> Vec<f64> {
        self.scores.iter().map(RunningAverage::average).collect()
    }

    pub fn stats(&self, is_training: bool) -> EpochStats {
        EpochStats {
            loss: self.loss.average(),
            data_time: self.data_time.average(),
            batch_time: self.batch_time.average(),
            scores: self.score_averages(),
            is_training,
        }
    }
}

/// Drives a `BatchProcessor` over every batch of a data source once.
pub struct EpochRunner<'a, M, O> {
    processor: BatchProcessor<'a, M, O>,
}

impl<'a, M, O> EpochRunner<'a, M, O>
where
    M: Model,
    O: Optimizer<M>,
{
    pub fn new(processor: BatchProcessor<'a, M, O>) -> Self {
        EpochRunner { processor }
    }

    /// Runs one pass. The model is put in eval mode when `is_eval`, train
    /// mode otherwise.
    ///
    /// Loss and scores are weighted by each batch's sample count. Batch
    /// callbacks are flushed with their collected results once the last batch
    /// is done, then every epoch callback receives the pass's `EpochStats`.
    pub fn run_epoch<D>(&mut self, data: &mut D, is_eval: bool) -> Result<EpochResult>
    where
        D: DataSource + ?Sized,
    {
        if is_eval {
            self.processor.model.eval();
        } else {
            self.processor.model.train();
        }

        let callbacks = &self.processor.callbacks;
        let mut result = EpochResult {
            loss: RunningAverage::new(),
            scores: vec![RunningAverage::new(); callbacks.score_count()],
            data_time: RunningAverage::new(),
            batch_time: RunningAverage::new(),
            batches: 0,
        };
        let mut collected: Vec<Vec<_>> = (0..callbacks.batch_count()).map(|_| Vec::new()).collect();

        let total = data.len();
        debug!(total, is_eval, "starting pass");

        let mut end = Instant::now();
        for (i, item) in data.batches().enumerate() {
            let (input, target) = item?;
            result.data_time.update(end.elapsed().as_secs_f64(), 1);

            let out = self.processor.process(input, target, is_eval)?;
            let weight = out.batch_size as u64;
            result.loss.update(out.loss, weight);
            for (avg, score) in result.scores.iter_mut().zip(&out.scores) {
                avg.update(*score, weight);
            }
            for (bucket, value) in collected.iter_mut().zip(out.callback_results) {
                bucket.push(value);
            }

            result.batch_time.update(end.elapsed().as_secs_f64(), 1);
            result.batches += 1;
            end = Instant::now();
            trace!(batch = i + 1, total, loss = result.loss.average(), "batch done");
        }

        for (cb, items) in self.processor.callbacks.batch.iter_mut().zip(collected) {
            cb.on_epoch_any(items, is_eval)?;
        }

        let stats = result.stats(!is_eval);
        for cb in self.processor.callbacks.epoch.iter_mut() {
            cb(&stats)?;
        }

        Ok(result)
    }
}
