use crate::math::matrix::Matrix;

pub struct MaeLoss;

impl MaeLoss {
    /// Per-example MAE: mean(|predicted - expected|)
    pub fn per_example(predicted: &Matrix, expected: &Matrix) -> Vec<f64> {
        let n = predicted.cols as f64;
        predicted.data.iter().zip(&expected.data)
            .map(|(p, y)| p.iter().zip(y).map(|(p, y)| (p - y).abs()).sum::<f64>() / n)
            .collect()
    }

    /// Subgradient: sign(p - y) / n_outputs, 0 when equal.
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        let n = predicted.cols as f64;
        (predicted.clone() - expected.clone()).map(|d| {
            if d > 0.0 { 1.0 / n } else if d < 0.0 { -1.0 / n } else { 0.0 }
        })
    }
}
