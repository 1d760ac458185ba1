use crate::error::Result;
use crate::math::matrix::Matrix;
use crate::optim::optimizer::{Optimizer, OptimizerState, StateValue};
use crate::tensor::{Param, Tensor};

const MOMENTUM_BUFFER: &str = "momentum_buffer";
const STEP: &str = "step";

/// Stochastic gradient descent with optional heavy-ball momentum.
///
/// Per-parameter state: `momentum_buffer` (tensor, only when momentum > 0)
/// and `step` (count).
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    state: OptimizerState,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate, momentum: 0.0, state: OptimizerState::new() }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Sgd {
        self.momentum = momentum;
        self
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Param]) -> Result<()> {
        let momentum = self.momentum;
        for (id, param) in params.iter_mut().enumerate() {
            let device = param.device();
            param.grad.ensure_on(device)?;
            let entry = self.state.entry(id).or_default();

            let update: Matrix = if momentum > 0.0 {
                let buf = match entry.get(MOMENTUM_BUFFER) {
                    Some(StateValue::Tensor(prev)) => {
                        prev.ensure_on(device)?;
                        prev.data().map(|v| v * momentum) + param.grad.data().clone()
                    }
                    _ => param.grad.data().clone(),
                };
                entry.insert(MOMENTUM_BUFFER.into(), StateValue::Tensor(Tensor::on(buf.clone(), device)));
                buf
            } else {
                param.grad.data().clone()
            };

            let steps = match entry.get(STEP) {
                Some(StateValue::Count(n)) => *n,
                _ => 0,
            };
            entry.insert(STEP.into(), StateValue::Count(steps + 1));

            let lr = self.learning_rate;
            let updated = param.value.data().clone() - update.map(|g| g * lr);
            *param.value.data_mut() = updated;
        }
        Ok(())
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;
    use crate::optim::optimizer::migrate_state;
    use crate::tensor::Device;
    use approx::assert_relative_eq;

    fn param(value: f64, grad: f64) -> Param {
        let mut p = Param::new(Matrix::scalar(value));
        p.accumulate_grad(&Matrix::scalar(grad));
        p
    }

    #[test]
    fn plain_step_descends_gradient() {
        let mut sgd = Sgd::new(0.1);
        let mut p = param(1.0, 2.0);
        sgd.step(&mut [&mut p]).unwrap();
        assert_relative_eq!(p.value.item(), 0.8);
        assert!(sgd.state()[&0].get(MOMENTUM_BUFFER).is_none());
        assert_eq!(sgd.state()[&0][STEP], StateValue::Count(1));
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let mut sgd = Sgd::new(0.1).with_momentum(0.9);
        let mut p = param(0.0, 1.0);
        sgd.step(&mut [&mut p]).unwrap();
        sgd.step(&mut [&mut p]).unwrap();
        // v1 = 1, v2 = 1.9 → x = -0.1 - 0.19
        assert_relative_eq!(p.value.item(), -0.29, epsilon = 1e-12);
    }

    #[test]
    fn stale_buffer_device_is_rejected_until_migrated() {
        let mut sgd = Sgd::new(0.1).with_momentum(0.9);
        let mut p = param(0.0, 1.0);
        sgd.step(&mut [&mut p]).unwrap();

        p.to_device(Device::Gpu(0));
        assert!(matches!(sgd.step(&mut [&mut p]), Err(TrainError::DeviceMismatch { .. })));

        assert_eq!(migrate_state(sgd.state_mut(), Device::Gpu(0)), 1);
        assert!(sgd.step(&mut [&mut p]).is_ok());
    }
}
