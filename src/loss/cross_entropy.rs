use crate::math::matrix::Matrix;

/// Categorical cross-entropy loss for use with a Softmax output layer.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// Per-example loss L = -sum(expected[i] * log(predicted[i] + eps)).
    ///
    /// `predicted` rows are softmax probabilities; `expected` rows are one-hot
    /// (or soft) target distributions.
    pub fn per_example(predicted: &Matrix, expected: &Matrix) -> Vec<f64> {
        predicted.data.iter().zip(&expected.data)
            .map(|(p, y)| p.iter().zip(y).map(|(p, e)| -e * (p + EPS).ln()).sum())
            .collect()
    }

    /// Combined Softmax + cross-entropy gradient w.r.t. the pre-softmax
    /// logits: predicted - expected. The Softmax layer's own derivative is
    /// identity, so the Jacobian is not applied twice.
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        predicted.clone() - expected.clone()
    }
}
