use crate::data::batch::Batch;
use crate::error::Result;
use crate::loss::criterion::LossFunction;
use crate::model::model::Model;
use crate::model::with_loss::{ModelWithLoss, StepOutput};
use crate::parallel::distributed::DistributedParallel;
use crate::parallel::replicated::ReplicatedParallel;
use crate::tensor::Device;

/// Execution topology chosen once by `set_device`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Single(Device),
    Replicated(Vec<Device>),
    Distributed(usize),
}

/// The adapter wrapped around the trainer's module. Holds only adapter
/// state; the module itself stays with the trainer so evaluation can run it
/// unwrapped.
#[derive(Debug)]
pub enum Parallel<M, L> {
    None(Device),
    Replicated(ReplicatedParallel<M, L>),
    Distributed(DistributedParallel),
}

impl<M, L> Parallel<M, L>
where
    M: Model + Clone,
    L: LossFunction + Clone,
{
    pub fn placement(&self) -> Placement {
        match self {
            Parallel::None(device) => Placement::Single(*device),
            Parallel::Replicated(dp) => Placement::Replicated(dp.devices().to_vec()),
            Parallel::Distributed(ddp) => Placement::Distributed(ddp.device_index()),
        }
    }

    pub fn forward(&mut self, module: &mut ModelWithLoss<M, L>, batch: &Batch) -> Result<StepOutput> {
        match self {
            Parallel::None(_) => module.forward(batch),
            Parallel::Replicated(dp) => dp.forward(module, batch),
            Parallel::Distributed(ddp) => ddp.forward(module, batch),
        }
    }

    pub fn backward(&mut self, module: &mut ModelWithLoss<M, L>) -> Result<()> {
        match self {
            Parallel::None(_) => module.backward(),
            Parallel::Replicated(dp) => dp.backward(module),
            Parallel::Distributed(ddp) => ddp.backward(module),
        }
    }

    /// Frees adapter-held device buffers (cached replicas).
    pub fn release_cache(&mut self) {
        if let Parallel::Replicated(dp) = self {
            dp.release_cache();
        }
    }
}
