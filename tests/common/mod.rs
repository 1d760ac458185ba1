#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use ferrite_trainer::config::Config;
use ferrite_trainer::data::{Batch, InMemoryLoader, INPUT, TARGET};
use ferrite_trainer::error::Result;
use ferrite_trainer::loss::{CompositeLoss, LossFunction, LossOutput, LossType};
use ferrite_trainer::optim::{Optimizer, OptimizerState};
use ferrite_trainer::train::{Results, Task};
use ferrite_trainer::{ActivationFunction, Matrix, Network, Param, Tensor};

/// MSE on `target` that counts how often it is evaluated.
#[derive(Debug, Clone)]
pub struct CountingLoss {
    inner: CompositeLoss,
    pub calls: Arc<AtomicUsize>,
}

impl LossFunction for CountingLoss {
    fn compute(&self, outputs: &[Tensor], batch: &Batch) -> Result<LossOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compute(outputs, batch)
    }
}

/// Regression task that records one result per example id.
#[derive(Debug, Clone, Default)]
pub struct RegressionTask {
    pub calls: Arc<AtomicUsize>,
    pub debug_calls: usize,
}

impl Task for RegressionTask {
    type Model = Network;
    type Loss = CountingLoss;

    fn get_losses(&self, _cfg: &Config, _local_rank: usize) -> Result<(Vec<String>, CountingLoss)> {
        let inner = CompositeLoss::single(LossType::Mse, TARGET);
        Ok((inner.stat_names(), CountingLoss { inner, calls: self.calls.clone() }))
    }

    fn debug(&mut self, _batch: &Batch, _output: &Tensor, _iter_id: usize) -> Result<()> {
        self.debug_calls += 1;
        Ok(())
    }

    fn save_result(&mut self, output: &Tensor, batch: &Batch, results: &mut Results) -> Result<()> {
        let ids = batch.meta_ids().unwrap_or_default();
        for (id, row) in ids.into_iter().zip(&output.data().data) {
            results.insert(id, json!(row[0]));
        }
        Ok(())
    }
}

/// Optimizer that leaves parameters alone and keeps a copy of every
/// gradient it was asked to apply.
#[derive(Default)]
pub struct Recorder {
    pub grads: Arc<Mutex<Vec<Vec<Matrix>>>>,
    state: OptimizerState,
}

impl Optimizer for Recorder {
    fn step(&mut self, params: &mut [&mut Param]) -> Result<()> {
        let grads = params.iter().map(|p| p.grad.data().clone()).collect();
        self.grads.lock().unwrap().push(grads);
        Ok(())
    }

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }
}

/// Clonable in-memory sink for progress output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn regression_net() -> Network {
    Network::new(vec![
        (3, 2, ActivationFunction::Tanh),
        (1, 3, ActivationFunction::Identity),
    ])
}

pub fn samples(n: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    (0..n)
        .map(|i| {
            let a = (i % 5) as f64 * 0.25;
            let b = (i % 3) as f64 * 0.5;
            (vec![a, b], vec![a - b])
        })
        .unzip()
}

pub fn loader(n: usize, batch_size: usize) -> InMemoryLoader {
    let (x, y) = samples(n);
    InMemoryLoader::from_samples(x, y, batch_size, false).unwrap()
}

pub fn batch(rows: Vec<Vec<f64>>, targets: Vec<f64>, ids: &[&str]) -> Batch {
    Batch::new()
        .with(INPUT, Tensor::from_rows(rows)).unwrap()
        .with(TARGET, Tensor::new(Matrix::column(targets))).unwrap()
        .with_meta(json!({ "ids": ids }))
}

pub fn param_values(params: Vec<&Param>) -> Vec<Matrix> {
    params.into_iter().map(|p| p.value.data().clone()).collect()
}
