use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::data::batch::Batch;
use crate::error::{Result, TrainError};
use crate::loss::loss_type::LossType;
use crate::math::matrix::Matrix;
use crate::tensor::Tensor;

/// Named loss components, one per-example (n×1) tensor each.
pub type LossStats = BTreeMap<String, Tensor>;

/// Result of evaluating a loss on one batch.
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Per-example total loss (n×1) or a scalar.
    pub loss: Tensor,
    pub stats: LossStats,
    /// ∂(mean loss)/∂(final output); seeds the model's backward pass.
    pub grad: Tensor,
}

/// A loss evaluated on the model's stage outputs and the full batch.
///
/// Implementations must report the same stat keys on every call.
pub trait LossFunction {
    fn compute(&self, outputs: &[Tensor], batch: &Batch) -> Result<LossOutput>;
}

/// One weighted criterion comparing the final output against a batch field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossTerm {
    pub name: String,
    pub kind: LossType,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Batch field holding the expected values.
    pub target: String,
}

fn default_weight() -> f64 {
    1.0
}

impl LossTerm {
    pub fn new(name: impl Into<String>, kind: LossType, target: impl Into<String>) -> LossTerm {
        LossTerm { name: name.into(), kind, weight: 1.0, target: target.into() }
    }

    pub fn weighted(mut self, weight: f64) -> LossTerm {
        self.weight = weight;
        self
    }
}

/// Weighted sum of `LossTerm`s.
///
/// Reports every term under its own name plus the weighted total under
/// `"loss"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeLoss {
    pub terms: Vec<LossTerm>,
}

pub const TOTAL: &str = "loss";

impl CompositeLoss {
    pub fn new(terms: Vec<LossTerm>) -> CompositeLoss {
        CompositeLoss { terms }
    }

    pub fn single(kind: LossType, target: impl Into<String>) -> CompositeLoss {
        CompositeLoss::new(vec![LossTerm::new(TOTAL, kind, target)])
    }

    /// Stat keys this loss reports, total first.
    pub fn stat_names(&self) -> Vec<String> {
        let mut names = vec![TOTAL.to_string()];
        names.extend(self.terms.iter().map(|t| t.name.clone()).filter(|n| n != TOTAL));
        names
    }
}

impl LossFunction for CompositeLoss {
    fn compute(&self, outputs: &[Tensor], batch: &Batch) -> Result<LossOutput> {
        let output = outputs.last()
            .ok_or_else(|| TrainError::Shape("model produced no outputs".into()))?;
        let device = output.device();
        let (n, cols) = (output.rows(), output.cols());

        let mut total = vec![0.0; n];
        let mut grad = Matrix::zeros(n, cols);
        let mut stats = LossStats::new();

        for term in &self.terms {
            let target = batch.get(&term.target)?;
            target.ensure_on(device)?;
            if target.rows() != n || target.cols() != cols {
                return Err(TrainError::Shape(format!(
                    "loss `{}`: output is {}×{} but `{}` is {}×{}",
                    term.name, n, cols, term.target, target.rows(), target.cols()
                )));
            }

            let per = term.kind.per_example(output.data(), target.data());
            for (acc, v) in total.iter_mut().zip(&per) {
                *acc += term.weight * v;
            }
            let scale = term.weight / n.max(1) as f64;
            grad.add_assign(&term.kind.derivative(output.data(), target.data()).map(|g| g * scale));

            if term.name != TOTAL {
                stats.insert(term.name.clone(), Tensor::on(Matrix::column(per), device));
            }
        }

        let loss = Tensor::on(Matrix::column(total), device);
        stats.insert(TOTAL.to_string(), loss.clone());
        Ok(LossOutput { loss, stats, grad: Tensor::on(grad, device) })
    }
}
