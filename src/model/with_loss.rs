use crate::data::batch::Batch;
use crate::error::{Result, TrainError};
use crate::loss::criterion::{LossFunction, LossStats};
use crate::model::model::{Mode, Model};
use crate::tensor::{Device, Param, Tensor};

/// What one forward pass through `ModelWithLoss` produces.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Last stage of the model's output sequence.
    pub output: Tensor,
    /// Per-example (or per-replica) total loss.
    pub loss: Tensor,
    pub stats: LossStats,
}

/// A model and its loss composed into one unit: batch in, final output,
/// loss and named loss components out.
#[derive(Debug, Clone)]
pub struct ModelWithLoss<M, L> {
    pub model: M,
    pub loss: L,
    grad_output: Option<Tensor>,
}

impl<M: Model, L: LossFunction> ModelWithLoss<M, L> {
    pub fn new(model: M, loss: L) -> ModelWithLoss<M, L> {
        ModelWithLoss { model, loss, grad_output: None }
    }

    /// `input` through the model, the whole output sequence and batch through
    /// the loss. Keeps the loss gradient for a following `backward`.
    pub fn forward(&mut self, batch: &Batch) -> Result<StepOutput> {
        let mut outputs = self.model.forward(batch.input()?)?;
        let res = self.loss.compute(&outputs, batch)?;
        self.grad_output = Some(res.grad);
        let output = outputs.pop()
            .ok_or_else(|| TrainError::Shape("model produced no outputs".into()))?;
        Ok(StepOutput { output, loss: res.loss, stats: res.stats })
    }

    /// Backpropagates the mean loss of the last `forward`.
    pub fn backward(&mut self) -> Result<()> {
        self.backward_scaled(1.0)
    }

    /// Backpropagates `scale` × the mean loss of the last `forward`.
    pub fn backward_scaled(&mut self, scale: f64) -> Result<()> {
        let grad = self.grad_output.take()
            .ok_or_else(|| TrainError::Setup("backward called without a preceding forward".into()))?;
        let grad = if scale == 1.0 {
            grad
        } else {
            let device = grad.device();
            Tensor::on(grad.data().map(|g| g * scale), device)
        };
        self.model.backward(&grad)
    }

    pub fn zero_grad(&mut self) {
        self.model.zero_grad();
    }

    pub fn params(&self) -> Vec<&Param> {
        self.model.params()
    }

    pub fn params_mut(&mut self) -> Vec<&mut Param> {
        self.model.params_mut()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.model.set_mode(mode);
    }

    pub fn mode(&self) -> Mode {
        self.model.mode()
    }

    pub fn device(&self) -> Device {
        self.model.device()
    }

    pub fn to_device(&mut self, device: Device) {
        self.model.to_device(device);
    }
}
