use serde::{Serialize, Deserialize};
use std::f64::consts::PI;

use crate::math::matrix::Matrix;

/// Non-linearity applied by a dense layer after its affine transform.
///
/// All variants operate on a whole batch (`n × size`). `Softmax` normalises
/// each row independently; every other variant is element-wise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    Sigmoid,
    ReLU,
    Identity,
    /// Pair with cross-entropy: the loss seeds the combined softmax+CE
    /// gradient, so the layer passes it through unchanged.
    Softmax,
    Tanh,
    LeakyReLU { alpha: f64 },
    Elu { alpha: f64 },
    Gelu,
    Swish,
}

const GELU_COEFF: f64 = 0.044715;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl ActivationFunction {
    /// Activation of a pre-activation batch `z`.
    pub fn apply(&self, z: &Matrix) -> Matrix {
        match self {
            ActivationFunction::Softmax => softmax_rows(z),
            ActivationFunction::Sigmoid => z.map(sigmoid),
            ActivationFunction::ReLU => z.map(|x| x.max(0.0)),
            ActivationFunction::Identity => z.clone(),
            ActivationFunction::Tanh => z.map(f64::tanh),
            ActivationFunction::LeakyReLU { alpha } => {
                let alpha = *alpha;
                z.map(move |x| if x > 0.0 { x } else { alpha * x })
            }
            ActivationFunction::Elu { alpha } => {
                let alpha = *alpha;
                z.map(move |x| if x > 0.0 { x } else { alpha * (x.exp() - 1.0) })
            }
            ActivationFunction::Gelu => z.map(|x| {
                let c = (2.0_f64 / PI).sqrt();
                0.5 * x * (1.0 + (c * (x + GELU_COEFF * x.powi(3))).tanh())
            }),
            ActivationFunction::Swish => z.map(|x| x * sigmoid(x)),
        }
    }

    /// Element-wise σ'(z), evaluated at the cached pre-activation.
    pub fn derivative(&self, z: &Matrix) -> Matrix {
        match self {
            ActivationFunction::Softmax | ActivationFunction::Identity => z.map(|_| 1.0),
            ActivationFunction::Sigmoid => z.map(|x| {
                let s = sigmoid(x);
                s * (1.0 - s)
            }),
            ActivationFunction::ReLU => z.map(|x| if x > 0.0 { 1.0 } else { 0.0 }),
            ActivationFunction::Tanh => z.map(|x| {
                let t = x.tanh();
                1.0 - t * t
            }),
            ActivationFunction::LeakyReLU { alpha } => {
                let alpha = *alpha;
                z.map(move |x| if x > 0.0 { 1.0 } else { alpha })
            }
            ActivationFunction::Elu { alpha } => {
                let alpha = *alpha;
                z.map(move |x| if x > 0.0 { 1.0 } else { alpha * x.exp() })
            }
            ActivationFunction::Gelu => z.map(|x| {
                let c = (2.0_f64 / PI).sqrt();
                let t = (c * (x + GELU_COEFF * x.powi(3))).tanh();
                let d_inner = c * (1.0 + 3.0 * GELU_COEFF * x.powi(2));
                0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * d_inner
            }),
            ActivationFunction::Swish => z.map(|x| {
                let s = sigmoid(x);
                s + x * s * (1.0 - s)
            }),
        }
    }
}

/// Numerically stable row-wise softmax.
fn softmax_rows(z: &Matrix) -> Matrix {
    let data = z.data.iter()
        .map(|row| {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = row.iter().map(|x| (x - max).exp()).collect();
            let total: f64 = exps.iter().sum();
            exps.into_iter().map(|e| e / total).collect()
        })
        .collect();
    Matrix { rows: z.rows, cols: z.cols, data }
}
