use std::fs;

use tracing::info;

use crate::callbacks::{BatchCallback, Callbacks, ScoreFn};
use crate::data::DataSource;
use crate::error::{BoxError, Result, TrainError};
use crate::model::Model;
use crate::optim::Optimizer;
use crate::tensor::{Backend, Tensor};
use crate::train::batch::BatchProcessor;
use crate::train::checkpoint::{CheckpointRecord, CheckpointStore, SavePolicy};
use crate::train::epoch::{EpochResult, EpochRunner};
use crate::train::epoch_stats::EpochStats;
use crate::train::history::MetricsHistory;
use crate::train::loop_config::LoopConfig;

/// Folds one validation loss into the best metric seen so far.
///
/// Returns the new best and whether `valid_loss` is a strict improvement;
/// a tie is not an improvement.
pub fn update_best(best_so_far: f64, valid_loss: f64) -> (f64, bool) {
    let is_best = valid_loss < best_so_far;
    (best_so_far.min(valid_loss), is_best)
}

/// What a finished `TrainLoop::run` reports.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// Epoch index the run started at (0 for a fresh run).
    pub start_epoch: usize,
    /// Epochs actually executed by this run.
    pub epochs_run: usize,
    pub best_metric: f64,
    /// `(train_loss, valid_loss)` of the last executed epoch.
    pub last_losses: Option<(f64, f64)>,
}

/// Epoch-based supervised training over a train and a validation source.
///
/// Each epoch is one training pass followed by one validation pass; after
/// it the checkpoint record and the metric tables are written to
/// `LoopConfig::output_path`.
pub struct TrainLoop<M, O, T, V> {
    model: M,
    optimizer: O,
    train_data: T,
    valid_data: V,
    backend: Backend,
    callbacks: Callbacks,
}

impl<M, O, T, V> TrainLoop<M, O, T, V>
where
    M: Model,
    O: Optimizer<M>,
    T: DataSource,
    V: DataSource,
{
    pub fn new(mut model: M, train_data: T, valid_data: V, optimizer: O, backend: Backend) -> Self {
        model.to_backend(backend);
        TrainLoop {
            model,
            optimizer,
            train_data,
            valid_data,
            backend,
            callbacks: Callbacks::new(),
        }
    }

    /// Registers a score computed from `(predictions, targets)` of every batch.
    pub fn add_score_callback<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&[Tensor], &[Tensor]) -> std::result::Result<f64, BoxError> + 'static,
    {
        self.callbacks.add_score(f);
        self
    }

    pub fn add_score_callbacks<I>(&mut self, fs: I) -> &mut Self
    where
        I: IntoIterator<Item = ScoreFn>,
    {
        self.callbacks.extend_scores(fs);
        self
    }

    pub fn add_batch_callback<C>(&mut self, callback: C) -> &mut Self
    where
        C: BatchCallback + 'static,
    {
        self.callbacks.add_batch(callback);
        self
    }

    pub fn add_epoch_callback<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&EpochStats) -> std::result::Result<(), BoxError> + 'static,
    {
        self.callbacks.add_epoch(f);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// One training pass over the training source.
    pub fn train_epoch(&mut self) -> Result<EpochResult> {
        let processor = BatchProcessor::new(&mut self.model, &mut self.optimizer, &mut self.callbacks, self.backend);
        EpochRunner::new(processor).run_epoch(&mut self.train_data, false)
    }

    /// One evaluation pass over the validation source.
    pub fn validate(&mut self) -> Result<EpochResult> {
        let processor = BatchProcessor::new(&mut self.model, &mut self.optimizer, &mut self.callbacks, self.backend);
        EpochRunner::new(processor).run_epoch(&mut self.valid_data, true)
    }

    /// Trains until `config.epochs_qty` epochs are complete, resuming from a
    /// checkpoint first if the config asks for it.
    ///
    /// Configuration problems (conflicting resume flags, a missing checkpoint,
    /// a history that does not cover the resumed epoch) fail before any epoch
    /// runs. Any later failure stops the run; artifacts of earlier epochs are
    /// left as they were.
    pub fn run(&mut self, config: &LoopConfig) -> Result<LoopOutcome> {
        config.validate()?;
        let dir = &config.output_path;
        fs::create_dir_all(dir).map_err(|e| TrainError::io(dir, e))?;

        let store = CheckpointStore::new(dir);
        let (mut best, start_epoch, mut history) = match config.resume_from() {
            Some(kind) => {
                let checkpoint = store.load(kind)?;
                let history = MetricsHistory::resume(dir, checkpoint.epoch, self.callbacks.score_count())?;
                self.model.load_state_dict(checkpoint.model_state)?;
                info!(
                    epoch = checkpoint.epoch,
                    best_metric = checkpoint.best_metric,
                    "resuming from {}",
                    kind.file_name()
                );
                (checkpoint.best_metric, checkpoint.epoch, history)
            }
            None => (f64::INFINITY, 0, MetricsHistory::new(dir)),
        };

        let mut outcome = LoopOutcome {
            start_epoch,
            epochs_run: 0,
            best_metric: best,
            last_losses: None,
        };

        for epoch in start_epoch..config.epochs_qty {
            info!(epoch, total = config.epochs_qty, "starting epoch");

            let train = self.train_epoch()?;
            let valid = self.validate()?;
            let (train_loss, valid_loss) = (train.loss.average(), valid.loss.average());
            history.push_losses(train_loss, valid_loss)?;

            let (new_best, is_best) = update_best(best, valid_loss);
            best = new_best;

            let policy = SavePolicy {
                write_numbered: config.save_all_checkpoints,
                write_last: config.save_last_checkpoint,
                write_best: config.save_best_checkpoint && is_best,
            };
            if policy.any() {
                let record = CheckpointRecord {
                    epoch: epoch + 1,
                    model_state: self.model.state_dict(),
                    best_metric: best,
                };
                store.save(&record, policy, &CheckpointStore::numbered_name(epoch))?;
            }
            history.save_losses()?;

            if self.callbacks.score_count() > 0 {
                history.record_scores(&train.score_averages(), &valid.score_averages())?;
            }

            info!(epoch, train_loss, valid_loss, best_metric = best, is_best, "epoch complete");
            outcome.epochs_run += 1;
            outcome.best_metric = best;
            outcome.last_losses = Some((train_loss, valid_loss));
        }

        Ok(outcome)
    }
}
