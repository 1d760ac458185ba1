use serde::{Serialize, Deserialize};

use crate::error::{Result, TrainError};
use crate::math::matrix::Matrix;
use crate::tensor::device::Device;

/// A matrix tagged with the device it lives on.
///
/// The leading dimension (`rows`) is the batch dimension for every tensor that
/// travels inside a `Batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: Matrix,
    device: Device,
}

impl Tensor {
    /// Host tensor.
    pub fn new(data: Matrix) -> Tensor {
        Tensor { data, device: Device::Cpu }
    }

    pub fn on(data: Matrix, device: Device) -> Tensor {
        Tensor { data, device }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Tensor {
        Tensor::new(Matrix::from_data(rows))
    }

    pub fn scalar(value: f64, device: Device) -> Tensor {
        Tensor::on(Matrix::scalar(value), device)
    }

    pub fn zeros_like(other: &Tensor) -> Tensor {
        Tensor::on(Matrix::zeros(other.data.rows, other.data.cols), other.device)
    }

    pub fn data(&self) -> &Matrix {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Matrix {
        &mut self.data
    }

    pub fn into_data(self) -> Matrix {
        self.data
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Leading (batch) dimension.
    pub fn rows(&self) -> usize {
        self.data.rows
    }

    pub fn cols(&self) -> usize {
        self.data.cols
    }

    /// Copy of this tensor on `device`. Values are untouched.
    pub fn to(&self, device: Device) -> Tensor {
        Tensor { data: self.data.clone(), device }
    }

    /// Moves this tensor to `device` without copying the buffer.
    pub fn into_device(mut self, device: Device) -> Tensor {
        self.device = device;
        self
    }

    /// 1×1 tensor holding the mean of every element.
    pub fn mean(&self) -> Tensor {
        Tensor::scalar(self.data.mean(), self.device)
    }

    /// Mean of every element as a plain number.
    pub fn item(&self) -> f64 {
        self.data.mean()
    }

    pub fn ensure_on(&self, device: Device) -> Result<()> {
        if self.device != device {
            return Err(TrainError::DeviceMismatch { expected: device, found: self.device });
        }
        Ok(())
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor::new(Matrix::default())
    }
}

impl From<Matrix> for Tensor {
    fn from(data: Matrix) -> Tensor {
        Tensor::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_keeps_values() {
        let t = Tensor::from_rows(vec![vec![1.0, -2.0], vec![0.5, 4.0]]);
        let moved = t.to(Device::Gpu(1));
        assert_eq!(moved.device(), Device::Gpu(1));
        assert_eq!(moved.data(), t.data());
    }

    #[test]
    fn device_check_reports_both_sides() {
        let t = Tensor::scalar(1.0, Device::Cpu);
        let err = t.ensure_on(Device::Gpu(0)).unwrap_err();
        assert!(matches!(
            err,
            TrainError::DeviceMismatch { expected: Device::Gpu(0), found: Device::Cpu }
        ));
    }

    #[test]
    fn mean_reduces_to_scalar_on_same_device() {
        let t = Tensor::on(Matrix::column(vec![1.0, 2.0, 3.0]), Device::Gpu(0));
        let m = t.mean();
        assert_eq!(m.rows(), 1);
        assert_eq!(m.item(), 2.0);
        assert_eq!(m.device(), Device::Gpu(0));
    }
}
