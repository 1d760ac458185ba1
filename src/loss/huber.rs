use crate::math::matrix::Matrix;

pub struct HuberLoss;

// Fixed δ = 1.0 keeps the enum variant unit (no f64 field) → preserves Eq + Copy.
const DELTA: f64 = 1.0;

fn huber(x: f64) -> f64 {
    if x.abs() <= DELTA {
        0.5 * x * x
    } else {
        DELTA * (x.abs() - 0.5 * DELTA)
    }
}

impl HuberLoss {
    /// Per-example Huber: mean(h(predicted − expected)).
    pub fn per_example(predicted: &Matrix, expected: &Matrix) -> Vec<f64> {
        let n = predicted.cols as f64;
        predicted.data.iter().zip(&expected.data)
            .map(|(p, y)| p.iter().zip(y).map(|(p, y)| huber(p - y)).sum::<f64>() / n)
            .collect()
    }

    /// x / n  if |x| ≤ δ,  else δ·sign(x) / n
    pub fn derivative(predicted: &Matrix, expected: &Matrix) -> Matrix {
        let n = predicted.cols as f64;
        (predicted.clone() - expected.clone()).map(|x| {
            if x.abs() <= DELTA { x / n } else { DELTA * x.signum() / n }
        })
    }
}
