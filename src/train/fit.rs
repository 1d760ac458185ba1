use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::data::loader::DataLoader;
use crate::error::Result;
use crate::train::epoch_stats::EpochStats;
use crate::train::fit_config::FitConfig;
use crate::train::task::{Results, Task};
use crate::train::trainer::{BaseTrainer, EpochMetrics};

/// What `fit` leaves behind.
#[derive(Debug, Clone, Default)]
pub struct FitSummary {
    /// Epochs that completed training.
    pub epochs_run: usize,
    /// Metrics of the last training epoch.
    pub train: EpochMetrics,
    /// Metrics and results of the last validation pass, if any ran.
    pub val: Option<EpochMetrics>,
    pub results: Results,
}

/// Trains for `config.epochs` epochs, validating on `val_data` every
/// `config.val_intervals` epochs.
///
/// # Early termination
/// The loop breaks early if:
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
///
/// Checked between epochs only; an epoch in progress always completes.
pub fn fit<T: Task>(
    trainer: &mut BaseTrainer<T>,
    config: &FitConfig,
    train_data: &dyn DataLoader,
    val_data: Option<&dyn DataLoader>,
) -> Result<FitSummary> {
    let mut summary = FitSummary::default();

    for epoch in 1..=config.epochs {
        if stopped(&config.stop_flag) {
            break;
        }

        let t_start = Instant::now();
        let (train, _) = trainer.train(epoch, train_data)?;
        summary.epochs_run = epoch;
        summary.train = train.clone();

        let val = match val_data {
            Some(data) if config.validates_after(epoch) => {
                let (metrics, results) = trainer.val(epoch, data)?;
                summary.val = Some(metrics.clone());
                summary.results = results;
                Some(metrics)
            }
            _ => None,
        };

        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train,
            val,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        info!(
            epoch,
            train_loss = ?stats.train_loss(),
            val_loss = ?stats.val_loss(),
            elapsed_ms = stats.elapsed_ms,
            "epoch complete"
        );

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                break;
            }
        }
    }

    Ok(summary)
}

fn stopped(flag: &Option<Arc<AtomicBool>>) -> bool {
    flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
}
