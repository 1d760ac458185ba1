use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::tensor::{Device, Param, Tensor};

/// One entry of an optimizer's per-parameter state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    Tensor(Tensor),
    Scalar(f64),
    Count(u64),
    Flag(bool),
}

/// State of one parameter, keyed by entry name (e.g. `momentum_buffer`).
pub type ParamState = BTreeMap<String, StateValue>;

/// Per-parameter state keyed by the parameter's position in `Model::params`.
pub type OptimizerState = BTreeMap<usize, ParamState>;

/// Applies updates to parameters from their accumulated gradients.
///
/// The update rule is opaque to the epoch runner; it only clears gradients,
/// steps, and relocates `state` when the model changes device.
pub trait Optimizer {
    fn zero_grad(&mut self, params: &mut [&mut Param]) {
        for p in params.iter_mut() {
            p.zero_grad();
        }
    }

    fn step(&mut self, params: &mut [&mut Param]) -> Result<()>;

    fn state(&self) -> &OptimizerState;

    fn state_mut(&mut self) -> &mut OptimizerState;
}

/// Moves every tensor-valued state entry to `device`, leaving scalar, count
/// and flag entries untouched. Idempotent and order-independent.
///
/// Returns how many tensors were relocated.
pub fn migrate_state(state: &mut OptimizerState, device: Device) -> usize {
    let mut moved = 0;
    for entries in state.values_mut() {
        for value in entries.values_mut() {
            if let StateValue::Tensor(t) = value {
                if t.device() != device {
                    *t = t.to(device);
                    moved += 1;
                }
            }
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::Matrix;

    fn state() -> OptimizerState {
        let mut s = OptimizerState::new();
        for i in 0..2 {
            let mut p = ParamState::new();
            p.insert("momentum_buffer".into(), StateValue::Tensor(Tensor::new(Matrix::filled(2, 2, i as f64 + 0.5))));
            p.insert("step".into(), StateValue::Count(3));
            p.insert("lr".into(), StateValue::Scalar(0.1));
            p.insert("nesterov".into(), StateValue::Flag(false));
            s.insert(i, p);
        }
        s
    }

    #[test]
    fn migration_moves_only_tensors() {
        let before = state();
        let mut after = before.clone();
        assert_eq!(migrate_state(&mut after, Device::Gpu(1)), 2);

        for (id, entries) in &after {
            for (key, value) in entries {
                match (value, &before[id][key]) {
                    (StateValue::Tensor(t), StateValue::Tensor(orig)) => {
                        assert_eq!(t.device(), Device::Gpu(1));
                        assert_eq!(t.data(), orig.data());
                    }
                    (other, orig) => assert_eq!(other, orig),
                }
            }
        }
    }

    #[test]
    fn migration_is_idempotent() {
        let mut once = state();
        migrate_state(&mut once, Device::Gpu(0));
        let mut twice = once.clone();
        assert_eq!(migrate_state(&mut twice, Device::Gpu(0)), 0);
        assert_eq!(once, twice);
    }
}
