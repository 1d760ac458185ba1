use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::math::matrix::Matrix;
use crate::model::model::Mode;
use crate::tensor::{Device, Param};

/// Fully connected layer operating on a batch (`n × input_size` → `n × size`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer{
    pub size: usize,
    /// Shape (input_size, size).
    pub weights: Param,
    /// Shape (1, size), broadcast over the batch.
    pub biases: Param,
    pub activator: ActivationFunction,
    /// Inverted-dropout drop probability applied to this layer's activations
    /// in `Mode::Train`. Zero disables it.
    #[serde(default)]
    pub dropout: f64,
    #[serde(skip)]
    input: Matrix,
    #[serde(skip)]
    pre_neurons: Matrix,  // z = XW + b, needed for σ'(z)
    #[serde(skip)]
    mask: Option<Matrix>,
}

impl Layer {
    pub fn new(size: usize, input_size: usize, activation: ActivationFunction) -> Layer {
        let weights = match activation {
            ActivationFunction::ReLU
            | ActivationFunction::LeakyReLU { .. }
            | ActivationFunction::Elu { .. }
            | ActivationFunction::Gelu
            | ActivationFunction::Swish => Matrix::he(input_size, size),
            _ => Matrix::xavier(input_size, size),
        };

        Layer {
            size,
            weights: Param::new(weights),
            biases: Param::new(Matrix::zeros(1, size)),
            activator: activation,
            dropout: 0.0,
            input: Matrix::default(),
            pre_neurons: Matrix::default(),
            mask: None,
        }
    }

    pub fn with_dropout(mut self, p: f64) -> Layer {
        self.dropout = p.clamp(0.0, 0.95);
        self
    }

    pub fn input_size(&self) -> usize {
        self.weights.value.rows()
    }

    /// Forward pass for a batch; caches what `compute_gradients` needs.
    pub fn feed_from(&mut self, input: &Matrix, mode: Mode) -> Matrix {
        let z = (input * self.weights.value.data()).add_row_broadcast(self.biases.value.data());
        let mut a = self.activator.apply(&z);

        self.mask = if mode == Mode::Train && self.dropout > 0.0 {
            let keep = 1.0 - self.dropout;
            let mut rng = rand::thread_rng();
            let mask = a.map(|_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 });
            a = a.hadamard(&mask);
            Some(mask)
        } else {
            None
        };

        self.input = input.clone();
        self.pre_neurons = z;
        a
    }

    /// Accumulates weight and bias gradients for `delta` (∂L/∂a for this
    /// layer's output) and returns ∂L/∂input for the previous layer.
    pub fn compute_gradients(&mut self, delta: &Matrix) -> Matrix {
        let delta = match &self.mask {
            Some(mask) => delta.hadamard(mask),
            None => delta.clone(),
        };
        // δ = error ⊙ σ'(z)
        let layer_delta = delta.hadamard(&self.activator.derivative(&self.pre_neurons));

        let weights_grad = &self.input.transpose() * &layer_delta;
        let biases_grad = layer_delta.column_sums();
        self.weights.accumulate_grad(&weights_grad);
        self.biases.accumulate_grad(&biases_grad);

        &layer_delta * &self.weights.value.data().transpose()
    }

    pub fn to_device(&mut self, device: Device) {
        self.weights.to_device(device);
        self.biases.to_device(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn eval_mode_never_drops() {
        let mut layer = Layer::new(4, 3, ActivationFunction::ReLU).with_dropout(0.5);
        let x = Matrix::filled(2, 3, 1.0);
        let a = layer.feed_from(&x, Mode::Eval);
        let b = layer.feed_from(&x, Mode::Eval);
        assert_eq!(a, b);
    }

    #[test]
    fn weight_gradient_matches_finite_difference() {
        let mut layer = Layer::new(2, 3, ActivationFunction::Tanh);
        let x = Matrix::from_data(vec![vec![0.3, -0.1, 0.8], vec![-0.5, 0.2, 0.1]]);

        // L = sum(a)
        let a = layer.feed_from(&x, Mode::Eval);
        layer.compute_gradients(&a.map(|_| 1.0));
        let analytic = layer.weights.grad.data().data[1][0];

        let h = 1e-6;
        let mut plus = layer.clone();
        plus.weights.value.data_mut().data[1][0] += h;
        let mut minus = layer.clone();
        minus.weights.value.data_mut().data[1][0] -= h;
        let numeric = (plus.feed_from(&x, Mode::Eval).sum()
            - minus.feed_from(&x, Mode::Eval).sum()) / (2.0 * h);

        assert_relative_eq!(analytic, numeric, epsilon = 1e-5);
    }
}
