use crate::math::matrix::Matrix;

pub struct BceLoss;

const EPS: f64 = 1e-12;

impl BceLoss {
    /// Per-example BCE: -mean(y·log(p+ε) + (1-y)·log(1-p+ε))
    pub fn per_example(predicted: &Matrix, expected: &Matrix) -> Vec<f64> {
        let n = predicted.cols as f64;
        predicted.data.iter().zip(&expected.data)
            .map(|(p, y)| {
                p.iter().zip(y)
                    .map(|(p, y)| -(y * (p + EPS).ln() + (1.0 - y) * (1.0 - p + EPS).ln()))
                    .sum::<f64>() / n
            })
            .collect()
    }

    /// (p - y) / ((p + ε) · (1 - p + ε) · n_outputs)
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        let n = predicted.cols as f64;
        let data = predicted.data.iter().zip(&expected.data)
            .map(|(p, y)| {
                p.iter().zip(y)
                    .map(|(p, y)| (p - y) / ((p + EPS) * (1.0 - p + EPS) * n))
                    .collect()
            })
            .collect();
        Matrix::from_data(data)
    }
}
