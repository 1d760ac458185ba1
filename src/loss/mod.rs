pub mod bce;
pub mod criterion;
pub mod cross_entropy;
pub mod huber;
pub mod loss_type;
pub mod mae;
pub mod mse;

pub use criterion::{CompositeLoss, LossFunction, LossOutput, LossStats, LossTerm};
pub use cross_entropy::CrossEntropyLoss;
pub use loss_type::LossType;
pub use mse::MseLoss;
