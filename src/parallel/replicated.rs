use std::collections::BTreeMap;

use tracing::trace;

use crate::data::batch::Batch;
use crate::error::{Result, TrainError};
use crate::loss::criterion::{LossFunction, LossStats};
use crate::math::matrix::Matrix;
use crate::model::model::Model;
use crate::model::with_loss::{ModelWithLoss, StepOutput};
use crate::tensor::{Device, Tensor};

/// Single-process replication over several devices.
///
/// Each forward scatters the batch into chunks, runs one replica per device
/// with a non-empty chunk (the primary module itself on `devices[0]`) and
/// gathers outputs, losses and stats back onto the primary device. The
/// returned loss holds one mean loss per active replica. Backward reduces
/// replica gradients into the primary module.
#[derive(Debug)]
pub struct ReplicatedParallel<M, L> {
    devices: Vec<Device>,
    chunk_sizes: Vec<usize>,
    /// Replica for `devices[i]` at index `i - 1`, reused across iterations
    /// until released.
    replicas: Vec<ModelWithLoss<M, L>>,
    /// Device indices that ran the last forward; `None` before any forward.
    active: Option<Vec<usize>>,
}

impl<M, L> ReplicatedParallel<M, L>
where
    M: Model + Clone,
    L: LossFunction + Clone,
{
    pub fn new(devices: Vec<Device>, chunk_sizes: Vec<usize>) -> Result<ReplicatedParallel<M, L>> {
        if devices.len() < 2 {
            return Err(TrainError::Setup("replication needs at least two devices".into()));
        }
        if !chunk_sizes.is_empty() && chunk_sizes.len() != devices.len() {
            return Err(TrainError::Setup(format!(
                "{} chunk sizes for {} devices",
                chunk_sizes.len(),
                devices.len()
            )));
        }
        Ok(ReplicatedParallel { devices, chunk_sizes, replicas: Vec::new(), active: None })
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn primary(&self) -> Device {
        self.devices[0]
    }

    pub fn cached_replicas(&self) -> usize {
        self.replicas.len()
    }

    /// Drops the cached replicas; they are rebuilt on the next forward.
    pub fn release_cache(&mut self) {
        self.replicas.clear();
        self.active = None;
    }

    /// `(device index, chunk size)` for every device that receives examples.
    /// Configured chunk sizes apply when they cover the batch exactly,
    /// otherwise the batch is split evenly (earlier devices take the
    /// remainder).
    fn plan(&self, n: usize) -> Vec<(usize, usize)> {
        let sizes = if self.chunk_sizes.iter().sum::<usize>() == n && !self.chunk_sizes.is_empty() {
            self.chunk_sizes.clone()
        } else {
            let k = self.devices.len();
            (0..k).map(|i| n / k + usize::from(i < n % k)).collect()
        };
        sizes.into_iter().enumerate().filter(|&(_, size)| size > 0).collect()
    }

    /// Brings the replicas of the active extra devices in line with `module`.
    fn replicate(&mut self, module: &ModelWithLoss<M, L>, active: &[usize]) {
        if active.iter().all(|&i| i == 0) {
            return;
        }
        if self.replicas.len() + 1 < self.devices.len() {
            self.replicas = self.devices[1..].iter()
                .map(|&device| {
                    let mut replica = module.clone();
                    replica.to_device(device);
                    replica
                })
                .collect();
            return;
        }
        for &i in active.iter().filter(|&&i| i > 0) {
            let replica = &mut self.replicas[i - 1];
            for (dst, src) in replica.params_mut().into_iter().zip(module.params()) {
                let device = dst.device();
                dst.value = src.value.to(device);
            }
            replica.set_mode(module.mode());
        }
    }

    pub fn forward(&mut self, module: &mut ModelWithLoss<M, L>, batch: &Batch) -> Result<StepOutput> {
        let plan = self.plan(batch.len());
        let sizes: Vec<usize> = plan.iter().map(|&(_, size)| size).collect();
        let chunks = batch.split(&sizes)?;
        let active: Vec<usize> = plan.iter().map(|&(i, _)| i).collect();
        self.replicate(module, &active);
        trace!(chunks = ?plan, "scattering batch across replicas");

        let primary = self.primary();
        let mut steps = Vec::with_capacity(chunks.len());
        for (&i, mut chunk) in active.iter().zip(chunks) {
            let step = if i == 0 {
                module.forward(&chunk)?
            } else {
                chunk.to_device(self.devices[i]);
                self.replicas[i - 1].forward(&chunk)?
            };
            steps.push(step);
        }
        self.active = Some(active);
        gather(steps, primary)
    }

    /// Each replica's loss enters the final mean with weight 1/active.
    /// Replica gradients are added onto whatever `module` already holds.
    pub fn backward(&mut self, module: &mut ModelWithLoss<M, L>) -> Result<()> {
        let active = self.active.take()
            .ok_or_else(|| TrainError::Setup("backward called without a preceding forward".into()))?;
        if active.is_empty() {
            return Ok(());
        }
        let scale = 1.0 / active.len() as f64;

        for &i in &active {
            if i == 0 {
                module.backward_scaled(scale)?;
                continue;
            }
            let replica = &mut self.replicas[i - 1];
            replica.zero_grad();
            replica.backward_scaled(scale)?;
            for (dst, src) in module.params_mut().into_iter().zip(replica.params()) {
                dst.accumulate_grad(src.grad.data());
            }
        }
        Ok(())
    }
}

fn gather(steps: Vec<StepOutput>, primary: Device) -> Result<StepOutput> {
    let mut outputs = Vec::with_capacity(steps.len());
    let mut losses = Vec::with_capacity(steps.len());
    let mut stats: BTreeMap<String, Vec<Matrix>> = BTreeMap::new();

    for step in steps {
        outputs.push(step.output.into_data());
        losses.push(step.loss.item());
        for (name, t) in step.stats {
            stats.entry(name).or_default().push(t.into_data());
        }
    }

    let mut gathered = LossStats::new();
    for (name, parts) in stats {
        gathered.insert(name, Tensor::on(Matrix::concat_rows(&parts)?, primary));
    }
    Ok(StepOutput {
        output: Tensor::on(Matrix::concat_rows(&outputs)?, primary),
        loss: Tensor::on(Matrix::column(losses), primary),
        stats: gathered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::data::batch::INPUT;
    use crate::loss::{CompositeLoss, LossType};
    use crate::network::Network;
    use approx::assert_relative_eq;

    type Unit = ModelWithLoss<Network, CompositeLoss>;

    fn unit() -> Unit {
        let net = Network::new(vec![
            (3, 2, ActivationFunction::Tanh),
            (1, 3, ActivationFunction::Identity),
        ]);
        ModelWithLoss::new(net, CompositeLoss::single(LossType::Mse, "y"))
    }

    fn batch(n: usize) -> Batch {
        let x = (0..n).map(|i| vec![i as f64 * 0.1, 1.0 - i as f64 * 0.2]).collect();
        let y = (0..n).map(|i| (i % 2) as f64).collect();
        Batch::new()
            .with(INPUT, Tensor::from_rows(x)).unwrap()
            .with("y", Tensor::new(Matrix::column(y))).unwrap()
    }

    fn devices() -> Vec<Device> {
        vec![Device::Gpu(0), Device::Gpu(1)]
    }

    #[test]
    fn plan_prefers_configured_chunks_and_falls_back_to_even_split() {
        let dp = ReplicatedParallel::<Network, CompositeLoss>::new(devices(), vec![3, 1]).unwrap();
        assert_eq!(dp.plan(4), vec![(0, 3), (1, 1)]);
        assert_eq!(dp.plan(5), vec![(0, 3), (1, 2)]);
        assert_eq!(dp.plan(1), vec![(0, 1)]);
    }

    #[test]
    fn rejects_bad_topology() {
        assert!(ReplicatedParallel::<Network, CompositeLoss>::new(vec![Device::Gpu(0)], vec![]).is_err());
        assert!(ReplicatedParallel::<Network, CompositeLoss>::new(devices(), vec![1, 2, 3]).is_err());
    }

    #[test]
    fn gathered_output_matches_single_device_forward() {
        let mut module = unit();
        module.to_device(Device::Gpu(0));
        let mut reference = module.clone();

        let mut b = batch(4);
        b.to_device(Device::Gpu(0));

        let mut dp = ReplicatedParallel::new(devices(), vec![]).unwrap();
        let step = dp.forward(&mut module, &b).unwrap();
        let single = reference.forward(&b).unwrap();

        assert_eq!(step.output.device(), Device::Gpu(0));
        assert_eq!(step.loss.rows(), 2);
        assert_eq!(dp.cached_replicas(), 1);
        for (a, b) in step.output.data().data.iter().zip(&single.output.data().data) {
            assert_relative_eq!(a[0], b[0], epsilon = 1e-12);
        }
        assert_relative_eq!(step.stats["loss"].item(), single.stats["loss"].item(), epsilon = 1e-12);
    }

    #[test]
    fn equal_chunks_reduce_to_full_batch_gradient() {
        let mut module = unit();
        module.to_device(Device::Gpu(0));
        let mut reference = module.clone();
        let mut b = batch(4);
        b.to_device(Device::Gpu(0));

        let mut dp = ReplicatedParallel::new(devices(), vec![2, 2]).unwrap();
        dp.forward(&mut module, &b).unwrap();
        dp.backward(&mut module).unwrap();

        reference.forward(&b).unwrap();
        reference.backward().unwrap();

        for (p, r) in module.params().iter().zip(reference.params()) {
            for (a, b) in p.grad.data().data.iter().flatten().zip(r.grad.data().data.iter().flatten()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn zero_chunks_skip_their_device() {
        let three = vec![Device::Gpu(0), Device::Gpu(1), Device::Gpu(2)];
        let dp = ReplicatedParallel::<Network, CompositeLoss>::new(three, vec![2, 0, 2]).unwrap();
        assert_eq!(dp.plan(4), vec![(0, 2), (2, 2)]);
        let dp = ReplicatedParallel::<Network, CompositeLoss>::new(devices(), vec![0, 4]).unwrap();
        assert_eq!(dp.plan(4), vec![(1, 4)]);
    }

    #[test]
    fn zero_sized_chunks_still_reduce_to_full_batch_gradient() {
        let three = vec![Device::Gpu(0), Device::Gpu(1), Device::Gpu(2)];
        for chunks in [vec![2, 0, 2], vec![0, 4, 0]] {
            let mut module = unit();
            module.to_device(Device::Gpu(0));
            let mut reference = module.clone();
            let mut b = batch(4);
            b.to_device(Device::Gpu(0));

            let mut dp = ReplicatedParallel::new(three.clone(), chunks).unwrap();
            let step = dp.forward(&mut module, &b).unwrap();
            assert_eq!(step.output.rows(), 4);
            assert_eq!(step.output.device(), Device::Gpu(0));
            dp.backward(&mut module).unwrap();

            let single = reference.forward(&b).unwrap();
            reference.backward().unwrap();

            assert_relative_eq!(step.loss.item(), single.loss.item(), epsilon = 1e-12);
            for (p, r) in module.params().iter().zip(reference.params()) {
                for (a, b) in p.grad.data().data.iter().flatten().zip(r.grad.data().data.iter().flatten()) {
                    assert_relative_eq!(*a, *b, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn release_cache_drops_replicas() {
        let mut module = unit();
        module.to_device(Device::Gpu(0));
        let mut b = batch(4);
        b.to_device(Device::Gpu(0));
        let mut dp = ReplicatedParallel::new(devices(), vec![]).unwrap();
        dp.forward(&mut module, &b).unwrap();
        dp.release_cache();
        assert_eq!(dp.cached_replicas(), 0);
        assert!(dp.backward(&mut module).is_err());
    }
}
