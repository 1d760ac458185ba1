use serde::{Serialize, Deserialize};

use crate::train::trainer::EpochMetrics;

/// Per-epoch statistics emitted by `fit`.
///
/// When a `progress_tx` channel is configured in `FitConfig`, `fit` sends one
/// `EpochStats` value at the end of every completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Training metrics of this epoch (loss components and `time`).
    pub train: EpochMetrics,
    /// Validation metrics, only on epochs that ran validation.
    pub val: Option<EpochMetrics>,
    /// Wall-clock duration of this epoch (train + val) in milliseconds.
    pub elapsed_ms: u64,
}

impl EpochStats {
    /// Total training loss, if the task reports one under `loss`.
    pub fn train_loss(&self) -> Option<f64> {
        self.train.get("loss").copied()
    }

    pub fn val_loss(&self) -> Option<f64> {
        self.val.as_ref()?.get("loss").copied()
    }
}
