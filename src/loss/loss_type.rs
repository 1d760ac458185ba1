use serde::{Serialize, Deserialize};

use crate::loss::{bce::BceLoss, cross_entropy::CrossEntropyLoss, huber::HuberLoss, mae::MaeLoss, mse::MseLoss};
use crate::math::matrix::Matrix;

/// Selects the criterion of one loss term.
///
/// - `Mse`: Mean-squared error; pair with Identity or Sigmoid output.
/// - `CrossEntropy`: Categorical cross-entropy; pair with Softmax output.
///   The gradient is the combined Softmax+CE gradient (predicted - expected).
/// - `BinaryCrossEntropy`: Binary cross-entropy; pair with Sigmoid output.
/// - `Mae`: Mean absolute error; pair with Identity output.
/// - `Huber`: Huber loss (δ=1.0); pair with Identity output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    Mse,
    CrossEntropy,
    BinaryCrossEntropy,
    Mae,
    Huber,
}

impl LossType {
    /// One loss value per row of `predicted`.
    pub fn per_example(self, predicted: &Matrix, expected: &Matrix) -> Vec<f64> {
        match self {
            LossType::Mse                => MseLoss::per_example(predicted, expected),
            LossType::CrossEntropy       => CrossEntropyLoss::per_example(predicted, expected),
            LossType::BinaryCrossEntropy => BceLoss::per_example(predicted, expected),
            LossType::Mae                => MaeLoss::per_example(predicted, expected),
            LossType::Huber              => HuberLoss::per_example(predicted, expected),
        }
    }

    /// Gradient of each row's loss with respect to that row of `predicted`.
    pub fn derivative(self, predicted: &Matrix, expected: &Matrix) -> Matrix {
        match self {
            LossType::Mse                => MseLoss::derivative(predicted, expected),
            LossType::CrossEntropy       => CrossEntropyLoss::derivative(predicted, expected),
            LossType::BinaryCrossEntropy => BceLoss::derivative(predicted, expected),
            LossType::Mae                => MaeLoss::derivative(predicted, expected),
            LossType::Huber              => HuberLoss::derivative(predicted, expected),
        }
    }
}
