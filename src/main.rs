use std::sync::Arc;
use std::thread;

use clap::Parser;
use rand::Rng;
use tracing::info;

use ferrite_trainer::data::{shard, InMemoryLoader};
use ferrite_trainer::error::{Result, TrainError};
use ferrite_trainer::parallel::{LocalProcessGroup, ProcessGroup};
use ferrite_trainer::train::{fit, BaseTrainer, FitConfig, FitSummary};
use ferrite_trainer::{logging, ClassificationTask, Config, Network, Sgd};

/// Trains a small classifier on generated four-cluster XOR data.
#[derive(Parser, Debug)]
#[command(name = "ferrite-trainer")]
#[command(about = "Epoch runner demo: XOR-cluster classification", long_about = None)]
struct Cli {
    /// JSON run configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Overrides TRAIN.EPOCHS
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Generated samples per split
    #[arg(long, default_value_t = 256)]
    samples: usize,

    /// Writes the effective configuration to this path and exits
    #[arg(long)]
    dump_config: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init("info,ferrite_trainer=info");

    let mut cfg = match &cli.config {
        Some(path) => Config::load_json(path)?,
        None => Config::default(),
    };
    if let Some(epochs) = cli.epochs {
        cfg.train.epochs = epochs;
    }
    cfg.validate()?;

    if let Some(path) = &cli.dump_config {
        cfg.save_json(path)?;
        info!(path = %path, "configuration written");
        return Ok(());
    }

    let (train_x, train_y) = xor_clusters(cli.samples);
    let (val_x, val_y) = xor_clusters(cli.samples / 4);

    let summary = if cfg.train.distribute {
        run_distributed(&cfg, train_x, train_y, val_x, val_y)?
    } else {
        run_rank(&cfg, 0, None, (train_x, train_y), (val_x, val_y))?
    };

    info!(
        epochs = summary.epochs_run,
        train = ?summary.train,
        val = ?summary.val,
        results = summary.results.len(),
        "training finished"
    );
    Ok(())
}

/// One thread per configured device, each holding one rank and an
/// equal-sized interleaved shard of the training data.
fn run_distributed(
    cfg: &Config,
    train_x: Vec<Vec<f64>>,
    train_y: Vec<Vec<f64>>,
    val_x: Vec<Vec<f64>>,
    val_y: Vec<Vec<f64>>,
) -> Result<FitSummary> {
    let world_size = cfg.devices().len();
    let handles: Vec<_> = LocalProcessGroup::new_group(world_size)
        .into_iter()
        .enumerate()
        .map(|(rank, group)| {
            let cfg = cfg.clone();
            let shard_x = shard(&train_x, rank, world_size);
            let shard_y = shard(&train_y, rank, world_size);
            let val = (val_x.clone(), val_y.clone());
            let group: Arc<dyn ProcessGroup> = Arc::new(group);
            thread::spawn(move || run_rank(&cfg, rank, Some(group), (shard_x, shard_y), val))
        })
        .collect();

    let mut summaries = Vec::with_capacity(world_size);
    for (rank, handle) in handles.into_iter().enumerate() {
        let summary = handle.join()
            .map_err(|_| TrainError::Collective(format!("rank {rank} panicked")))??;
        summaries.push(summary);
    }
    Ok(summaries.swap_remove(0))
}

fn run_rank(
    cfg: &Config,
    local_rank: usize,
    group: Option<Arc<dyn ProcessGroup>>,
    (train_x, train_y): (Vec<Vec<f64>>, Vec<Vec<f64>>),
    (val_x, val_y): (Vec<Vec<f64>>, Vec<Vec<f64>>),
) -> Result<FitSummary> {
    let network = Network::from_spec(&cfg.model)?;
    let sgd = Sgd::new(cfg.train.lr).with_momentum(cfg.train.momentum);
    let mut trainer = BaseTrainer::new(cfg.clone(), local_rank, network, Some(Box::new(sgd)), ClassificationTask::new())?;
    if let Some(group) = group {
        trainer = trainer.with_process_group(group);
    }
    if local_rank != 0 {
        trainer = trainer.with_progress_output(Box::new(std::io::sink()));
    }

    let devices = cfg.devices();
    trainer.set_device(&devices, &cfg.train.chunk_sizes, cfg.primary_device(local_rank))?;

    let train_data = InMemoryLoader::from_samples(train_x, train_y, cfg.train.batch_size, true)?;
    let val_data = InMemoryLoader::from_samples(val_x, val_y, cfg.train.batch_size, false)?;
    fit(&mut trainer, &FitConfig::from_config(cfg), &train_data, Some(&val_data))
}

/// Points around the four unit-square corners; opposite corners share a
/// class. Targets are one-hot over two classes.
fn xor_clusters(n: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|i| {
            let (a, b) = ((i & 1) as f64, ((i >> 1) & 1) as f64);
            let x = vec![a + rng.gen_range(-0.15..0.15), b + rng.gen_range(-0.15..0.15)];
            let class = (i & 1) ^ ((i >> 1) & 1);
            let mut y = vec![0.0; 2];
            y[class] = 1.0;
            (x, y)
        })
        .unzip()
}
