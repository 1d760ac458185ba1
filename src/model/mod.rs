pub mod model;
pub mod with_loss;

pub use model::{Mode, Model};
pub use with_loss::{ModelWithLoss, StepOutput};
