use crate::math::matrix::Matrix;

pub struct MseLoss;

impl MseLoss {
    /// Per-example MSE: mean over outputs of (p - y)².
    pub fn per_example(predicted: &Matrix, expected: &Matrix) -> Vec<f64> {
        let n = predicted.cols as f64;
        predicted.data.iter().zip(&expected.data)
            .map(|(p, y)| p.iter().zip(y).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / n)
            .collect()
    }

    /// ∂(per-example loss)/∂p = 2(p - y) / n_outputs
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        let n = predicted.cols as f64;
        (predicted.clone() - expected.clone()).map(|d| 2.0 * d / n)
    }
}
