use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;
use crate::tensor::device::Device;
use crate::tensor::tensor::Tensor;

/// A trainable tensor with its gradient buffer.
///
/// Gradients accumulate across `backward` calls until `zero_grad` is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub value: Tensor,
    pub grad: Tensor,
}

impl Param {
    pub fn new(value: Matrix) -> Param {
        let grad = Matrix::zeros(value.rows, value.cols);
        Param { value: Tensor::new(value), grad: Tensor::new(grad) }
    }

    pub fn device(&self) -> Device {
        self.value.device()
    }

    pub fn zero_grad(&mut self) {
        self.grad.data_mut().fill(0.0);
    }

    pub fn accumulate_grad(&mut self, grad: &Matrix) {
        self.grad.data_mut().add_assign(grad);
    }

    pub fn to_device(&mut self, device: Device) {
        self.value = self.value.to(device);
        self.grad = self.grad.to(device);
    }
}
