use serde_json::json;
use tracing::debug;

use crate::config::Config;
use crate::data::batch::Batch;
use crate::data::loader::TARGET;
use crate::error::{Result, TrainError};
use crate::loss::{CompositeLoss, LossType};
use crate::network::Network;
use crate::tensor::Tensor;
use crate::train::task::{Results, Task};

/// Multi-class classification over a softmax `Network`.
///
/// Targets are one-hot rows under `target`. Validation stores, per example
/// id (`meta.ids`), the predicted class and its probability.
#[derive(Debug, Clone)]
pub struct ClassificationTask {
    pub target: String,
}

impl Default for ClassificationTask {
    fn default() -> Self {
        ClassificationTask { target: TARGET.to_string() }
    }
}

impl ClassificationTask {
    pub fn new() -> ClassificationTask {
        ClassificationTask::default()
    }
}

impl Task for ClassificationTask {
    type Model = Network;
    type Loss = CompositeLoss;

    fn get_losses(&self, cfg: &Config, local_rank: usize) -> Result<(Vec<String>, CompositeLoss)> {
        let loss = CompositeLoss::single(LossType::CrossEntropy, self.target.clone());
        let names = loss.stat_names();
        debug!(task = %cfg.task, local_rank, losses = ?names, "built classification loss");
        Ok((names, loss))
    }

    fn debug(&mut self, batch: &Batch, output: &Tensor, iter_id: usize) -> Result<()> {
        let predicted = output.data().argmax_rows();
        let expected = batch.get(&self.target)?.data().argmax_rows();
        let correct = predicted.iter().zip(&expected).filter(|(p, e)| p == e).count();
        debug!(iter_id, ?predicted, ?expected, correct, "classification batch");
        Ok(())
    }

    fn save_result(&mut self, output: &Tensor, batch: &Batch, results: &mut Results) -> Result<()> {
        let ids = batch.meta_ids().ok_or_else(|| TrainError::MissingField("meta.ids".into()))?;
        if ids.len() != output.rows() {
            return Err(TrainError::Shape(format!(
                "{} ids for {} outputs",
                ids.len(),
                output.rows()
            )));
        }
        let classes = output.data().argmax_rows();
        for ((id, class), row) in ids.into_iter().zip(classes).zip(&output.data().data) {
            results.insert(id, json!({ "class": class, "score": row[class] }));
        }
        Ok(())
    }
}
