use std::sync::Arc;

use tracing::debug;

use crate::data::batch::Batch;
use crate::error::Result;
use crate::loss::criterion::LossFunction;
use crate::math::matrix::Matrix;
use crate::model::model::Model;
use crate::model::with_loss::{ModelWithLoss, StepOutput};
use crate::parallel::process_group::ProcessGroup;

/// One rank of a data-parallel job: the local module runs on this rank's
/// device only, and gradients are averaged across ranks during backward.
pub struct DistributedParallel {
    group: Arc<dyn ProcessGroup>,
    device_index: usize,
}

impl DistributedParallel {
    /// Binds `module` to the group and overwrites its parameters with rank
    /// 0's, so every rank starts from identical weights. Collective: every
    /// rank must call it.
    pub fn new<M: Model, L: LossFunction>(
        group: Arc<dyn ProcessGroup>,
        device_index: usize,
        module: &mut ModelWithLoss<M, L>,
    ) -> Result<DistributedParallel> {
        let mut values: Vec<Matrix> = module.params().iter().map(|p| p.value.data().clone()).collect();
        group.broadcast(&mut values, 0)?;
        for (param, value) in module.params_mut().into_iter().zip(values) {
            *param.value.data_mut() = value;
        }
        debug!(rank = group.rank(), world_size = group.world_size(), device_index, "joined process group");
        Ok(DistributedParallel { group, device_index })
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn group(&self) -> &Arc<dyn ProcessGroup> {
        &self.group
    }

    pub fn forward<M: Model, L: LossFunction>(
        &mut self,
        module: &mut ModelWithLoss<M, L>,
        batch: &Batch,
    ) -> Result<StepOutput> {
        module.forward(batch)
    }

    /// Local backward followed by a blocking mean all-reduce of every
    /// parameter gradient.
    pub fn backward<M: Model, L: LossFunction>(&mut self, module: &mut ModelWithLoss<M, L>) -> Result<()> {
        module.backward()?;
        let mut grads: Vec<Matrix> = module.params().iter().map(|p| p.grad.data().clone()).collect();
        self.group.all_reduce_mean(&mut grads)?;
        for (param, grad) in module.params_mut().into_iter().zip(grads) {
            *param.grad.data_mut() = grad;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DistributedParallel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedParallel")
            .field("rank", &self.group.rank())
            .field("world_size", &self.group.world_size())
            .field("device_index", &self.device_index)
            .finish()
    }
}
