// End-to-end tests for TrainLoop::run.
//
// Covers the artifacts a run leaves in its output directory, the best
// checkpoint tie-break, and resuming from saved checkpoints:
// 1. loss and score tables grow by one row per epoch
// 2. checkpoints fire according to the save flags
// 3. a resumed run restarts at the last completed epoch with a truncated history
// 4. configuration problems fail before any epoch runs

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use ferrite_train::{
    scores, Activation, Backend, Batch, BoxError, EpochStats, InMemoryDataset, LoopConfig, LossType, Mlp, Model,
    Optimizer, Parameter, Sgd, StateDict, Tensor, Tensors, TrainError, TrainLoop,
};
use tempfile::TempDir;

/// Passes its inputs through unchanged. Training loss is fixed; validation
/// losses are popped from a queue (1.0 once it runs dry).
struct IdentityModel {
    w: Parameter,
    training: bool,
    valid_losses: VecDeque<f64>,
    modes: Rc<RefCell<Vec<bool>>>,
}

impl IdentityModel {
    fn new(valid_losses: &[f64]) -> (IdentityModel, Rc<RefCell<Vec<bool>>>) {
        let modes = Rc::new(RefCell::new(Vec::new()));
        let model = IdentityModel {
            w: Parameter::new("w", Tensor::scalar(0.0)),
            training: true,
            valid_losses: valid_losses.iter().copied().collect(),
            modes: modes.clone(),
        };
        (model, modes)
    }

    fn weight(&self) -> f64 {
        self.w.value.data[0]
    }
}

impl Model for IdentityModel {
    fn forward(&mut self, inputs: &[Tensor]) -> Result<Tensors, BoxError> {
        let first = inputs.first().ok_or("identity model needs one input")?;
        Ok(first.clone().into())
    }

    fn loss(&mut self, _: &[Tensor], _: &[Tensor]) -> Result<f64, BoxError> {
        if self.training {
            Ok(0.5)
        } else {
            Ok(self.valid_losses.pop_front().unwrap_or(1.0))
        }
    }

    fn backward(&mut self) -> Result<(), BoxError> {
        self.w.grad[0] += 1.0;
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.w]
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("w".to_string(), self.w.value.clone());
        state
    }

    fn load_state_dict(&mut self, mut state: StateDict) -> Result<(), BoxError> {
        self.w.value = state.remove("w").ok_or("missing parameter 'w'")?;
        Ok(())
    }

    fn train(&mut self) {
        self.training = true;
        self.modes.borrow_mut().push(true);
    }

    fn eval(&mut self) {
        self.training = false;
        self.modes.borrow_mut().push(false);
    }
}

/// Plain gradient step that counts how often it ran.
struct CountingOptimizer {
    steps: Rc<Cell<usize>>,
}

impl Optimizer<IdentityModel> for CountingOptimizer {
    fn zero_grad(&mut self, model: &mut IdentityModel) {
        model.w.zero_grad();
    }

    fn step(&mut self, model: &mut IdentityModel) -> Result<(), BoxError> {
        self.steps.set(self.steps.get() + 1);
        model.w.value.data[0] -= 0.1 * model.w.grad[0];
        Ok(())
    }
}

fn batches(n: usize) -> Vec<Batch> {
    (0..n)
        .map(|i| {
            let t = Tensor::from_rows(vec![vec![i as f64]]).unwrap();
            (t.clone().into(), t.into())
        })
        .collect()
}

type StubLoop = TrainLoop<IdentityModel, CountingOptimizer, Vec<Batch>, Vec<Batch>>;

fn stub_loop(valid_losses: &[f64]) -> (StubLoop, Rc<RefCell<Vec<bool>>>, Rc<Cell<usize>>) {
    let (model, modes) = IdentityModel::new(valid_losses);
    let steps = Rc::new(Cell::new(0));
    let optimizer = CountingOptimizer { steps: steps.clone() };
    let trainer = TrainLoop::new(model, batches(4), batches(2), optimizer, Backend::Cpu);
    (trainer, modes, steps)
}

fn read_csv(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let row = line
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

fn checkpoint_json(path: &Path) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[test]
fn test_fresh_run_writes_one_row_per_epoch() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = temp_dir.path().join("run");
    let (mut trainer, _, _) = stub_loop(&[]);
    trainer.add_score_callback(|_, _| Ok(1.0));

    let outcome = trainer.run(&LoopConfig::new(2, &out))?;

    assert_eq!(outcome.start_epoch, 0);
    assert_eq!(outcome.epochs_run, 2);
    assert_eq!(outcome.last_losses, Some((0.5, 1.0)));

    let losses = read_csv(&out.join("loss.csv"))?;
    assert_eq!(losses, vec![vec![0.5, 1.0], vec![0.5, 1.0]]);
    assert_eq!(read_csv(&out.join("train_scores.csv"))?, vec![vec![1.0], vec![1.0]]);
    assert_eq!(read_csv(&out.join("valid_scores.csv"))?, vec![vec![1.0], vec![1.0]]);

    // No save flag set: no checkpoint files at all.
    assert!(!out.join("model_last.json").exists());
    assert!(!out.join("model_best.json").exists());
    assert!(!out.join("checkpoint0.json").exists());
    Ok(())
}

#[test]
fn test_no_score_callbacks_means_no_score_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trainer, _, _) = stub_loop(&[]);

    trainer.run(&LoopConfig::new(1, temp_dir.path()))?;

    assert!(temp_dir.path().join("loss.csv").exists());
    assert!(!temp_dir.path().join("train_scores.csv").exists());
    assert!(!temp_dir.path().join("valid_scores.csv").exists());
    Ok(())
}

#[test]
fn test_optimizer_only_steps_during_training() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trainer, modes, steps) = stub_loop(&[]);

    trainer.run(&LoopConfig::new(2, temp_dir.path()))?;

    // 2 epochs x 4 training batches; validation never steps.
    assert_eq!(steps.get(), 8);
    assert_eq!(*modes.borrow(), vec![true, false, true, false]);
    // Each step moved w by -0.1 * 1.0.
    assert!((trainer.model().weight() + 0.8).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_epoch_callbacks_see_both_passes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trainer, _, _) = stub_loop(&[0.9, 0.9, 0.4, 0.4]);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    trainer.add_epoch_callback(move |stats: &EpochStats| {
        sink.borrow_mut().push((stats.is_training, stats.loss));
        Ok(())
    });

    trainer.run(&LoopConfig::new(2, temp_dir.path()))?;

    assert_eq!(*seen.borrow(), vec![(true, 0.5), (false, 0.9), (true, 0.5), (false, 0.4)]);
    Ok(())
}

#[test]
fn test_save_all_writes_numbered_checkpoints() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trainer, _, _) = stub_loop(&[]);

    trainer.run(&LoopConfig::new(3, temp_dir.path()).with_save_all(true))?;

    for epoch in 0..3 {
        let record = checkpoint_json(&temp_dir.path().join(format!("checkpoint{}.json", epoch)))?;
        assert_eq!(record["epoch"], epoch + 1);
    }
    assert!(!temp_dir.path().join("model_last.json").exists());
    Ok(())
}

#[test]
fn test_best_checkpoint_tracks_strict_improvements() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // Two validation batches per epoch: epoch averages are 0.9, 0.5, 0.6.
    let (mut trainer, _, _) = stub_loop(&[0.9, 0.9, 0.5, 0.5, 0.6, 0.6]);

    let outcome = trainer.run(&LoopConfig::new(3, temp_dir.path()).with_save_best(true).with_save_last(true))?;

    assert_eq!(outcome.best_metric, 0.5);
    let best = checkpoint_json(&temp_dir.path().join("model_best.json"))?;
    assert_eq!(best["epoch"], 2);
    assert_eq!(best["best_metric"], 0.5);
    let last = checkpoint_json(&temp_dir.path().join("model_last.json"))?;
    assert_eq!(last["epoch"], 3);
    assert_eq!(last["best_metric"], 0.5);
    Ok(())
}

#[test]
fn test_tied_validation_loss_keeps_first_best() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trainer, _, _) = stub_loop(&[0.7; 6]);

    trainer.run(&LoopConfig::new(3, temp_dir.path()).with_save_best(true))?;

    let best = checkpoint_json(&temp_dir.path().join("model_best.json"))?;
    assert_eq!(best["epoch"], 1);
    Ok(())
}

#[test]
fn test_resume_last_reruns_final_epoch_and_truncates_history() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut first, _, _) = stub_loop(&[]);
    first.add_score_callback(|_, _| Ok(1.0));
    first.run(&LoopConfig::new(3, temp_dir.path()).with_save_last(true))?;
    assert_eq!(read_csv(&temp_dir.path().join("loss.csv"))?.len(), 3);

    let (mut second, _, steps) = stub_loop(&[]);
    second.add_score_callback(|_, _| Ok(1.0));
    let outcome = second.run(&LoopConfig::new(5, temp_dir.path()).with_load_last(true).with_save_last(true))?;

    // Stored "next epoch" is 3; the run restarts at the last completed one.
    assert_eq!(outcome.start_epoch, 2);
    assert_eq!(outcome.epochs_run, 3);
    assert_eq!(steps.get(), 12);
    assert_eq!(read_csv(&temp_dir.path().join("loss.csv"))?.len(), 5);
    assert_eq!(read_csv(&temp_dir.path().join("train_scores.csv"))?.len(), 5);
    assert_eq!(read_csv(&temp_dir.path().join("valid_scores.csv"))?.len(), 5);
    assert_eq!(checkpoint_json(&temp_dir.path().join("model_last.json"))?["epoch"], 5);
    Ok(())
}

#[test]
fn test_resume_restores_model_state_and_best_metric() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut first, _, _) = stub_loop(&[0.9, 0.9, 0.5, 0.5, 0.6, 0.6]);
    first.run(&LoopConfig::new(3, temp_dir.path()).with_save_best(true))?;
    let best = checkpoint_json(&temp_dir.path().join("model_best.json"))?;
    let saved_w = best["model_state"]["w"]["data"][0].as_f64().unwrap_or(f64::NAN);

    // epochs_qty equal to the resume point: state is loaded, nothing runs.
    let (mut second, _, steps) = stub_loop(&[]);
    let outcome = second.run(&LoopConfig::new(1, temp_dir.path()).with_load_best(true))?;

    assert_eq!(outcome.start_epoch, 1);
    assert_eq!(outcome.epochs_run, 0);
    assert_eq!(outcome.best_metric, 0.5);
    assert_eq!(steps.get(), 0);
    assert_eq!(second.model().weight(), saved_w);
    Ok(())
}

#[test]
fn test_conflicting_resume_flags_fail_before_touching_disk() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let out = temp_dir.path().join("never-created");
    let (mut trainer, modes, _) = stub_loop(&[]);

    let err = trainer
        .run(&LoopConfig::new(2, &out).with_load_best(true).with_load_last(true))
        .unwrap_err();

    assert!(matches!(err, TrainError::ConflictingResume));
    assert!(!out.exists());
    assert!(modes.borrow().is_empty());
    Ok(())
}

#[test]
fn test_resume_without_checkpoint_is_an_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trainer, modes, _) = stub_loop(&[]);

    let err = trainer
        .run(&LoopConfig::new(2, temp_dir.path()).with_load_last(true))
        .unwrap_err();

    match err {
        TrainError::MissingCheckpoint { path } => assert!(path.ends_with("model_last.json")),
        other => panic!("expected MissingCheckpoint, got {other:?}"),
    }
    assert!(modes.borrow().is_empty());
    Ok(())
}

#[test]
fn test_resume_with_short_history_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut first, _, _) = stub_loop(&[]);
    first.run(&LoopConfig::new(3, temp_dir.path()).with_save_last(true))?;

    // Simulate a loss table that lost its last two rows.
    let loss_path = temp_dir.path().join("loss.csv");
    let text = fs::read_to_string(&loss_path)?;
    let first_line = text.lines().next().unwrap_or_default().to_string();
    fs::write(&loss_path, format!("{}\n", first_line))?;

    let (mut second, _, steps) = stub_loop(&[]);
    let err = second
        .run(&LoopConfig::new(5, temp_dir.path()).with_load_last(true))
        .unwrap_err();

    assert!(matches!(
        err,
        TrainError::HistoryMismatch { checkpoint_epoch: 2, history_rows: 1, .. }
    ));
    assert_eq!(steps.get(), 0);
    Ok(())
}

#[test]
fn test_collaborator_error_stops_the_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (model, _) = IdentityModel::new(&[]);
    let steps = Rc::new(Cell::new(0));
    let optimizer = CountingOptimizer { steps: steps.clone() };
    let mut bad_batches = batches(3);
    bad_batches[1].0 = Tensors::List(Vec::new());
    let mut trainer = TrainLoop::new(model, bad_batches, batches(2), optimizer, Backend::Cpu);

    let err = trainer.run(&LoopConfig::new(2, temp_dir.path())).unwrap_err();

    assert!(matches!(err, TrainError::Collaborator(_)));
    assert_eq!(err.to_string(), "identity model needs one input");
    // The first batch stepped; the failing one aborted the pass.
    assert_eq!(steps.get(), 1);
    assert!(!temp_dir.path().join("loss.csv").exists());
    Ok(())
}

#[test]
fn test_failing_score_callback_stops_the_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trainer, _, steps) = stub_loop(&[]);
    trainer.add_score_callback(|_, _| Err("score unavailable".into()));

    let err = trainer.run(&LoopConfig::new(2, temp_dir.path())).unwrap_err();

    assert!(matches!(err, TrainError::Collaborator(_)));
    assert_eq!(err.to_string(), "score unavailable");
    // The first batch had already stepped when its score failed.
    assert_eq!(steps.get(), 1);
    assert!(!temp_dir.path().join("loss.csv").exists());
    Ok(())
}

#[test]
fn test_model_can_be_seeded_and_taken_back() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (mut trainer, _, _) = stub_loop(&[]);
    trainer.model_mut().w.value.data[0] = 2.0;

    trainer.run(&LoopConfig::new(1, temp_dir.path()).with_save_last(true))?;

    let model = trainer.into_model();
    assert!((model.weight() - 1.6).abs() < 1e-12);
    let last = checkpoint_json(&temp_dir.path().join("model_last.json"))?;
    assert_eq!(last["model_state"]["w"]["data"][0], model.weight());
    Ok(())
}

#[test]
fn test_mlp_learns_xor() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let inputs = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
    let labels = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
    let train = InMemoryDataset::new(inputs.clone(), labels.clone(), 4)?;
    let valid = InMemoryDataset::new(inputs, labels, 4)?;
    let model = Mlp::seeded(
        vec![(8, 2, Activation::Tanh), (2, 8, Activation::Softmax)],
        LossType::CrossEntropy,
        7,
    )?;
    let mut trainer = TrainLoop::new(model, train, valid, Sgd::new(0.1).with_momentum(0.9), Backend::Cpu);
    trainer.add_score_callback(scores::accuracy);

    let outcome = trainer.run(&LoopConfig::new(400, temp_dir.path()).with_save_best(true))?;

    let losses = read_csv(&temp_dir.path().join("loss.csv"))?;
    assert_eq!(losses.len(), 400);
    let (first_valid, last_valid) = (losses[0][1], losses[399][1]);
    assert!(last_valid < first_valid, "valid loss went {first_valid} -> {last_valid}");
    assert!(outcome.best_metric <= last_valid);
    assert!(temp_dir.path().join("model_best.json").exists());
    Ok(())
}
