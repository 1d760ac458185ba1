use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::Config;
use crate::data::batch::Batch;
use crate::error::{Result, TrainError};
use crate::loss::criterion::LossFunction;
use crate::model::model::Model;
use crate::tensor::Tensor;

/// Per-example results collected during validation, keyed by example id.
pub type Results = BTreeMap<String, Value>;

/// Task-specific behavior plugged into `BaseTrainer`.
///
/// Every hook has a default body that fails with `TrainError::NotImplemented`,
/// so a task only provides what its runs actually reach: `get_losses` is
/// always called at construction, `debug` only with `DEBUG > 0`, and
/// `save_result` only during validation.
pub trait Task {
    type Model: Model + Clone;
    type Loss: LossFunction + Clone;

    /// Names of the loss components to track, and the loss that reports them.
    fn get_losses(&self, cfg: &Config, local_rank: usize) -> Result<(Vec<String>, Self::Loss)> {
        let _ = (cfg, local_rank);
        Err(TrainError::NotImplemented("Task::get_losses"))
    }

    /// Inspects one batch and its final output.
    fn debug(&mut self, batch: &Batch, output: &Tensor, iter_id: usize) -> Result<()> {
        let _ = (batch, output, iter_id);
        Err(TrainError::NotImplemented("Task::debug"))
    }

    /// Records per-example results for one validation batch.
    fn save_result(&mut self, output: &Tensor, batch: &Batch, results: &mut Results) -> Result<()> {
        let _ = (output, batch, results);
        Err(TrainError::NotImplemented("Task::save_result"))
    }
}
