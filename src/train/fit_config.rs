use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use crate::config::Config;
use crate::train::epoch_stats::EpochStats;

/// Configuration for a `fit` run.
///
/// # Fields
/// - `epochs`: number of training epochs
/// - `val_intervals`: validate after every N-th epoch; `0` never validates
/// - `progress_tx`: optional channel sender; one `EpochStats` is sent per
///   completed epoch. If the receiver is dropped the run
///   stops early.
/// - `stop_flag`: optional atomic flag; when set from another thread the
///   run stops after the current epoch.
pub struct FitConfig {
    pub epochs: usize,
    pub val_intervals: usize,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl FitConfig {
    /// No progress channel, no stop flag.
    pub fn new(epochs: usize, val_intervals: usize) -> Self {
        FitConfig { epochs, val_intervals, progress_tx: None, stop_flag: None }
    }

    /// Epoch count and validation interval from the `TRAIN` section.
    pub fn from_config(cfg: &Config) -> Self {
        FitConfig::new(cfg.train.epochs, cfg.train.val_intervals)
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Whether `epoch` (1-based) ends with a validation pass.
    pub fn validates_after(&self, epoch: usize) -> bool {
        self.val_intervals > 0 && epoch % self.val_intervals == 0
    }
}
