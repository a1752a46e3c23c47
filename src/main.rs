//! XOR demo for ferrite-train.
//!
//! Trains a 2 → 4 (Tanh) → 2 (Softmax) network with cross-entropy and
//! reports accuracy as a score. Every loop option is a flag:
//!
//!   ferrite-train --epochs 300 --output runs/xor --save-last --save-best
//!   ferrite-train --epochs 600 --output runs/xor --resume last --save-last
//!
//! Set `RUST_LOG=debug` to see every artifact written.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use ferrite_train::{
    scores, Activation, Backend, EpochStats, InMemoryDataset, LoopConfig, LossType, Mlp, Sgd, TrainLoop,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResumeFrom {
    Best,
    Last,
}

#[derive(Debug, Parser)]
#[command(name = "ferrite-train", about = "Train a small network on XOR with checkpoint/resume")]
struct Args {
    /// JSON file with a LoopConfig; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Total epochs, counting any resumed ones.
    #[arg(long)]
    epochs: Option<usize>,

    /// Directory for checkpoints and metric CSVs.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Resume from a previously saved checkpoint.
    #[arg(long, value_enum)]
    resume: Option<ResumeFrom>,

    #[arg(long)]
    save_best: bool,

    #[arg(long)]
    save_last: bool,

    #[arg(long)]
    save_all: bool,

    #[arg(long, default_value_t = 0.5)]
    lr: f64,

    #[arg(long, default_value_t = 0.9)]
    momentum: f64,

    #[arg(long, default_value_t = 2)]
    batch_size: usize,

    /// Seed for the weight initialisation.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

impl Args {
    fn loop_config(&self) -> Result<LoopConfig> {
        let mut cfg = match &self.config {
            Some(path) => LoopConfig::load_json(path)
                .with_context(|| format!("Failed to read loop config {}", path.display()))?,
            None => LoopConfig::new(300, "runs/xor"),
        };
        if let Some(epochs) = self.epochs {
            cfg.epochs_qty = epochs;
        }
        if let Some(output) = &self.output {
            cfg.output_path = output.clone();
        }
        match self.resume {
            Some(ResumeFrom::Best) => cfg = cfg.with_load_best(true).with_load_last(false),
            Some(ResumeFrom::Last) => cfg = cfg.with_load_last(true).with_load_best(false),
            None => {}
        }
        cfg.save_best_checkpoint |= self.save_best;
        cfg.save_last_checkpoint |= self.save_last;
        cfg.save_all_checkpoints |= self.save_all;
        Ok(cfg)
    }
}

fn xor_dataset(batch_size: usize, shuffle: bool) -> Result<InMemoryDataset> {
    let inputs = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    // Class index: XOR of the two inputs.
    let labels = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
    Ok(InMemoryDataset::new(inputs, labels, batch_size)?.with_shuffle(shuffle))
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = args.loop_config()?;

    let model = Mlp::seeded(
        vec![(4, 2, Activation::Tanh), (2, 4, Activation::Softmax)],
        LossType::CrossEntropy,
        args.seed,
    )?;
    let optimizer = Sgd::new(args.lr).with_momentum(args.momentum);

    let mut trainer = TrainLoop::new(
        model,
        xor_dataset(args.batch_size, true)?,
        xor_dataset(4, false)?,
        optimizer,
        Backend::Cpu,
    );
    trainer
        .add_score_callback(scores::accuracy)
        .add_epoch_callback(|stats: &EpochStats| {
            let phase = if stats.is_training { "train" } else { "valid" };
            info!(
                phase,
                loss = stats.loss,
                accuracy = stats.scores.first().copied().unwrap_or(0.0),
                batch_ms = stats.batch_time * 1e3,
                "pass finished"
            );
            Ok(())
        });

    let outcome = trainer
        .run(&config)
        .with_context(|| format!("Training into {} failed", config.output_path.display()))?;

    info!(
        start_epoch = outcome.start_epoch,
        epochs_run = outcome.epochs_run,
        best_valid_loss = outcome.best_metric,
        "done"
    );
    Ok(())
}
