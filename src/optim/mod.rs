pub mod optimizer;
pub mod sgd;

pub use optimizer::{migrate_state, Optimizer, OptimizerState, ParamState, StateValue};
pub use sgd::Sgd;
