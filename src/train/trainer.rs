use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::data::loader::DataLoader;
use crate::error::{Result, TrainError};
use crate::model::model::Mode;
use crate::model::with_loss::ModelWithLoss;
use crate::optim::optimizer::{migrate_state, Optimizer};
use crate::parallel::{DistributedParallel, Parallel, Placement, ProcessGroup, ReplicatedParallel};
use crate::tensor::Device;
use crate::train::progress::{Phase, Progress, Style};
use crate::train::running_stat::RunningStat;
use crate::train::task::{Results, Task};

/// Running means of every tracked loss component plus `time` (minutes).
pub type EpochMetrics = BTreeMap<String, f64>;

/// Runs training and validation epochs for one process.
///
/// Owns the model wrapped with its loss, the placement adapter chosen by
/// `set_device`, and an optional optimizer. Everything task-specific goes
/// through `T`.
pub struct BaseTrainer<T: Task> {
    task: T,
    model_with_loss: ModelWithLoss<T::Model, T::Loss>,
    parallel: Parallel<T::Model, T::Loss>,
    optimizer: Option<Box<dyn Optimizer>>,
    loss_stats: Vec<String>,
    config: Config,
    local_rank: usize,
    device: Device,
    process_group: Option<Arc<dyn ProcessGroup>>,
    progress_out: Box<dyn Write + Send>,
}

impl<T: Task> BaseTrainer<T> {
    /// Builds the trainer and asks `task` for its loss. The model stays on
    /// whatever device it was created on until `set_device`.
    pub fn new(
        config: Config,
        local_rank: usize,
        model: T::Model,
        optimizer: Option<Box<dyn Optimizer>>,
        task: T,
    ) -> Result<BaseTrainer<T>> {
        let (loss_stats, loss) = task.get_losses(&config, local_rank)?;
        let model_with_loss = ModelWithLoss::new(model, loss);
        let device = model_with_loss.device();
        Ok(BaseTrainer {
            task,
            model_with_loss,
            parallel: Parallel::None(device),
            optimizer,
            loss_stats,
            config,
            local_rank,
            device,
            process_group: None,
            progress_out: Box::new(std::io::stdout()),
        })
    }

    /// Established process group this rank belongs to. Required before
    /// `set_device` when `TRAIN.DISTRIBUTE` is on.
    pub fn with_process_group(mut self, group: Arc<dyn ProcessGroup>) -> BaseTrainer<T> {
        self.process_group = Some(group);
        self
    }

    /// Redirects progress output (stdout by default).
    pub fn with_progress_output(mut self, out: Box<dyn Write + Send>) -> BaseTrainer<T> {
        self.progress_out = out;
        self
    }

    /// Places the model on `device` and picks the execution adapter.
    ///
    /// Distributed: the model runs on `devices[local_rank]` only and joins
    /// the process group (a collective; every rank must call it). Otherwise
    /// more than one device replicates the model across `devices` with
    /// `devices[0]` as primary. Either way tensor-valued optimizer state
    /// follows the model to `device`.
    pub fn set_device(&mut self, devices: &[Device], chunk_sizes: &[usize], device: Device) -> Result<()> {
        if devices.is_empty() {
            return Err(TrainError::Setup("no devices given".into()));
        }
        if !chunk_sizes.is_empty() && chunk_sizes.len() != devices.len() {
            return Err(TrainError::Setup(format!(
                "{} chunk sizes for {} devices",
                chunk_sizes.len(),
                devices.len()
            )));
        }

        if self.config.train.distribute {
            let group = self.process_group.clone()
                .ok_or_else(|| TrainError::Setup("distributed training requires a process group".into()))?;
            let expected = devices.get(self.local_rank).copied().ok_or_else(|| {
                TrainError::Setup(format!("local rank {} outside {} devices", self.local_rank, devices.len()))
            })?;
            if device != expected {
                return Err(TrainError::DeviceMismatch { expected, found: device });
            }
            if group.rank() != self.local_rank {
                return Err(TrainError::Setup(format!(
                    "process group rank {} does not match local rank {}",
                    group.rank(),
                    self.local_rank
                )));
            }
            let ddp = DistributedParallel::new(group, self.local_rank, &mut self.model_with_loss)?;
            self.model_with_loss.to_device(device);
            self.parallel = Parallel::Distributed(ddp);
        } else if devices.len() > 1 {
            if device != devices[0] {
                return Err(TrainError::DeviceMismatch { expected: devices[0], found: device });
            }
            let dp = ReplicatedParallel::new(devices.to_vec(), chunk_sizes.to_vec())?;
            self.model_with_loss.to_device(device);
            self.parallel = Parallel::Replicated(dp);
        } else {
            self.model_with_loss.to_device(device);
            self.parallel = Parallel::None(device);
        }
        self.device = device;

        if let Some(optimizer) = self.optimizer.as_mut() {
            let moved = migrate_state(optimizer.state_mut(), device);
            debug!(moved, %device, "migrated optimizer state");
        }
        debug!(placement = ?self.parallel.placement(), %device, "model placed");
        Ok(())
    }

    /// One full pass over `data`.
    ///
    /// Consumes at most `data.len()` batches. Train updates the parameters
    /// after every batch; Val leaves them untouched and collects per-example
    /// results through `Task::save_result`.
    pub fn run_epoch(&mut self, phase: Phase, epoch: usize, data: &dyn DataLoader) -> Result<(EpochMetrics, Results)> {
        let multi_device = self.config.gpus.len() > 1;
        match phase {
            Phase::Train => {
                if self.optimizer.is_none() {
                    return Err(TrainError::Setup("training requires an optimizer".into()));
                }
                self.model_with_loss.set_mode(Mode::Train);
            }
            Phase::Val => {
                self.model_with_loss.set_mode(Mode::Eval);
                self.parallel.release_cache();
            }
        }
        // Evaluation on several devices runs the bare module on the primary.
        let use_adapter = phase == Phase::Train || !multi_device;

        let names = &self.loss_stats;
        let mut stats = vec![RunningStat::new(); names.len()];
        let mut data_time = RunningStat::new();
        let mut batch_time = RunningStat::new();
        let mut results = Results::new();

        let total = data.len();
        let mut progress = Progress::new(
            &mut *self.progress_out,
            self.config.label(),
            phase,
            epoch,
            total,
            Style::from_print_freq(self.config.print_freq),
            self.config.train.hide_data_time,
        );
        debug!(%phase, epoch, batches = total, "epoch started");

        let started = Instant::now();
        let mut boundary = Instant::now();
        for (iter_id, mut batch) in data.iter().enumerate() {
            if iter_id >= total {
                warn!(%phase, epoch, declared = total, "data stream yielded more batches than declared; stopping");
                break;
            }
            data_time.update(boundary.elapsed().as_secs_f64(), 1);

            batch.to_device(self.device);
            let step = if use_adapter {
                self.parallel.forward(&mut self.model_with_loss, &batch)?
            } else {
                self.model_with_loss.forward(&batch)?
            };
            let loss = step.loss.mean();
            trace!(iter_id, loss = loss.item(), "forward done");

            if phase == Phase::Train {
                if let Some(optimizer) = self.optimizer.as_mut() {
                    optimizer.zero_grad(&mut self.model_with_loss.params_mut());
                    self.parallel.backward(&mut self.model_with_loss)?;
                    optimizer.step(&mut self.model_with_loss.params_mut())?;
                }
            }

            batch_time.update(boundary.elapsed().as_secs_f64(), 1);
            boundary = Instant::now();

            let n = batch.len();
            for (name, stat) in names.iter().zip(stats.iter_mut()) {
                let value = step.stats.get(name).ok_or_else(|| TrainError::LossStat(name.clone()))?;
                stat.update(value.item(), n);
            }

            let view: Vec<(&str, &RunningStat)> = names.iter().map(String::as_str).zip(stats.iter()).collect();
            progress.update(iter_id, &view, &data_time, &batch_time)?;

            if self.config.debug > 0 {
                self.task.debug(&batch, &step.output, iter_id)?;
            }
            if phase == Phase::Val {
                self.task.save_result(&step.output, &batch, &mut results)?;
            }
        }
        progress.finish()?;

        let mut metrics: EpochMetrics = names.iter().cloned().zip(stats.iter().map(|s| s.avg)).collect();
        metrics.insert("time".into(), started.elapsed().as_secs_f64() / 60.0);
        info!(%phase, epoch, metrics = ?metrics, "epoch finished");
        Ok((metrics, results))
    }

    pub fn train(&mut self, epoch: usize, data: &dyn DataLoader) -> Result<(EpochMetrics, Results)> {
        self.run_epoch(Phase::Train, epoch, data)
    }

    pub fn val(&mut self, epoch: usize, data: &dyn DataLoader) -> Result<(EpochMetrics, Results)> {
        self.run_epoch(Phase::Val, epoch, data)
    }

    pub fn placement(&self) -> Placement {
        self.parallel.placement()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn local_rank(&self) -> usize {
        self.local_rank
    }

    pub fn loss_stats(&self) -> &[String] {
        &self.loss_stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut T {
        &mut self.task
    }

    pub fn model_with_loss(&self) -> &ModelWithLoss<T::Model, T::Loss> {
        &self.model_with_loss
    }

    pub fn model_with_loss_mut(&mut self) -> &mut ModelWithLoss<T::Model, T::Loss> {
        &mut self.model_with_loss
    }

    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.optimizer.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::data::loader::{InMemoryLoader, TARGET};
    use crate::loss::{CompositeLoss, LossType};
    use crate::math::matrix::Matrix;
    use crate::network::Network;
    use crate::optim::optimizer::StateValue;
    use crate::optim::Sgd;
    use crate::parallel::LocalProcessGroup;

    struct Regression;

    impl Task for Regression {
        type Model = Network;
        type Loss = CompositeLoss;

        fn get_losses(&self, _cfg: &Config, _local_rank: usize) -> Result<(Vec<String>, CompositeLoss)> {
            Ok((vec!["loss".into()], CompositeLoss::single(LossType::Mse, TARGET)))
        }
    }

    fn net() -> Network {
        Network::new(vec![
            (4, 2, ActivationFunction::Tanh),
            (1, 4, ActivationFunction::Identity),
        ])
    }

    fn trainer(config: Config) -> BaseTrainer<Regression> {
        let sgd = Sgd::new(0.05).with_momentum(0.9);
        BaseTrainer::new(config, 0, net(), Some(Box::new(sgd)), Regression)
            .unwrap()
            .with_progress_output(Box::new(std::io::sink()))
    }

    fn loader() -> InMemoryLoader {
        let x = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
        let y = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
        InMemoryLoader::from_samples(x, y, 2, false).unwrap()
    }

    #[test]
    fn default_hooks_are_not_implemented() {
        struct Bare;
        impl Task for Bare {
            type Model = Network;
            type Loss = CompositeLoss;
        }
        let err = BaseTrainer::new(Config::default(), 0, net(), None, Bare).err().unwrap();
        assert!(matches!(err, TrainError::NotImplemented("Task::get_losses")));
    }

    #[test]
    fn single_device_uses_module_directly() {
        let mut t = trainer(Config::default());
        t.set_device(&[Device::Gpu(0)], &[], Device::Gpu(0)).unwrap();
        assert_eq!(t.placement(), Placement::Single(Device::Gpu(0)));
        assert_eq!(t.model_with_loss().device(), Device::Gpu(0));
    }

    #[test]
    fn several_devices_replicate() {
        let mut cfg = Config::default();
        cfg.gpus = vec![0, 1];
        let mut t = trainer(cfg);
        let devices = [Device::Gpu(0), Device::Gpu(1)];
        t.set_device(&devices, &[1, 1], Device::Gpu(0)).unwrap();
        assert_eq!(t.placement(), Placement::Replicated(devices.to_vec()));
        assert!(matches!(
            t.set_device(&devices, &[], Device::Gpu(1)),
            Err(TrainError::DeviceMismatch { .. })
        ));
    }

    #[test]
    fn invalid_placements_are_setup_errors() {
        let mut t = trainer(Config::default());
        assert!(matches!(t.set_device(&[], &[], Device::Cpu), Err(TrainError::Setup(_))));
        assert!(matches!(
            t.set_device(&[Device::Gpu(0), Device::Gpu(1)], &[4], Device::Gpu(0)),
            Err(TrainError::Setup(_))
        ));
    }

    #[test]
    fn distributed_without_group_fails() {
        let mut cfg = Config::default();
        cfg.train.distribute = true;
        let mut t = trainer(cfg);
        let err = t.set_device(&[Device::Gpu(0)], &[], Device::Gpu(0)).unwrap_err();
        assert!(matches!(err, TrainError::Setup(_)));
        assert_eq!(t.placement(), Placement::Single(Device::Cpu));
    }

    #[test]
    fn distributed_checks_rank_and_device() {
        let mut cfg = Config::default();
        cfg.train.distribute = true;
        let group: Arc<dyn ProcessGroup> = Arc::new(LocalProcessGroup::new_group(1).remove(0));
        let mut t = trainer(cfg).with_process_group(group);
        assert!(matches!(
            t.set_device(&[Device::Gpu(0)], &[], Device::Gpu(3)),
            Err(TrainError::DeviceMismatch { .. })
        ));
        t.set_device(&[Device::Gpu(0)], &[], Device::Gpu(0)).unwrap();
        assert_eq!(t.placement(), Placement::Distributed(0));
    }

    struct Unreachable;

    impl ProcessGroup for Unreachable {
        fn rank(&self) -> usize {
            0
        }

        fn world_size(&self) -> usize {
            2
        }

        fn all_reduce_mean(&self, _buffers: &mut [Matrix]) -> Result<()> {
            Err(TrainError::Collective("peer unreachable".into()))
        }

        fn broadcast(&self, _buffers: &mut [Matrix], _root: usize) -> Result<()> {
            Err(TrainError::Collective("peer unreachable".into()))
        }
    }

    #[test]
    fn failed_join_leaves_placement_untouched() {
        let mut cfg = Config::default();
        cfg.train.distribute = true;
        let mut t = trainer(cfg).with_process_group(Arc::new(Unreachable));
        let devices = [Device::Gpu(0), Device::Gpu(1)];

        let err = t.set_device(&devices, &[], Device::Gpu(0)).unwrap_err();
        assert!(matches!(err, TrainError::Collective(_)));
        assert_eq!(t.device(), Device::Cpu);
        assert_eq!(t.model_with_loss().device(), Device::Cpu);
        assert_eq!(t.placement(), Placement::Single(Device::Cpu));
    }

    #[test]
    fn set_device_moves_optimizer_state() {
        let mut t = trainer(Config::default());
        t.train(1, &loader()).unwrap();
        t.set_device(&[Device::Gpu(2)], &[], Device::Gpu(2)).unwrap();

        let state = t.optimizer().unwrap().state();
        assert!(!state.is_empty());
        for entries in state.values() {
            for value in entries.values() {
                match value {
                    StateValue::Tensor(tensor) => assert_eq!(tensor.device(), Device::Gpu(2)),
                    StateValue::Count(n) => assert_eq!(*n, 2),
                    _ => {}
                }
            }
        }
        assert!(t.train(2, &loader()).is_ok());
    }

    #[test]
    fn training_without_optimizer_is_rejected() {
        let mut t = BaseTrainer::new(Config::default(), 0, net(), None, Regression)
            .unwrap()
            .with_progress_output(Box::new(std::io::sink()));
        assert!(matches!(t.train(1, &loader()), Err(TrainError::Setup(_))));
    }

    #[test]
    fn undeclared_stat_is_reported() {
        struct Misnamed;
        impl Task for Misnamed {
            type Model = Network;
            type Loss = CompositeLoss;

            fn get_losses(&self, _cfg: &Config, _local_rank: usize) -> Result<(Vec<String>, CompositeLoss)> {
                Ok((vec!["hm_loss".into()], CompositeLoss::single(LossType::Mse, TARGET)))
            }
        }
        let mut t = BaseTrainer::new(Config::default(), 0, net(), Some(Box::new(Sgd::new(0.1))), Misnamed)
            .unwrap()
            .with_progress_output(Box::new(std::io::sink()));
        let err = t.train(1, &loader()).unwrap_err();
        assert!(matches!(err, TrainError::LossStat(name) if name == "hm_loss"));
    }
}
