pub mod math;
pub mod tensor;
pub mod activation;
pub mod layers;
pub mod network;
pub mod model;
pub mod loss;
pub mod optim;
pub mod data;
pub mod parallel;
pub mod train;
pub mod tasks;
pub mod config;
pub mod error;
pub mod logging;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use tensor::{Device, Param, Tensor};
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::network::Network;
pub use model::{Mode, Model, ModelWithLoss};
pub use loss::{CompositeLoss, LossFunction, LossType};
pub use optim::{Optimizer, Sgd};
pub use data::{Batch, DataLoader, InMemoryLoader};
pub use parallel::{LocalProcessGroup, Placement, ProcessGroup};
pub use train::{fit, BaseTrainer, FitConfig, Phase, RunningStat, Task};
pub use tasks::ClassificationTask;
pub use config::Config;
pub use error::{Result, TrainError};
