use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use serde_json::json;

use crate::data::batch::{Batch, INPUT};
use crate::error::{Result, TrainError};
use crate::math::matrix::Matrix;
use crate::tensor::Tensor;

/// Field name `InMemoryLoader` stores labels under.
pub const TARGET: &str = "target";

/// A finite, restartable stream of batches.
///
/// `len` is declared up front and is an upper bound: the epoch runner never
/// consumes more than `len` batches even if `iter` yields more.
pub trait DataLoader {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a fresh pass over the data.
    fn iter(&self) -> Box<dyn Iterator<Item = Batch> + '_>;
}

enum Source {
    Batches(Vec<Batch>),
    Samples {
        inputs: Vec<Vec<f64>>,
        targets: Vec<Vec<f64>>,
        batch_size: usize,
        shuffle: bool,
    },
}

/// Loader over data already held in memory.
pub struct InMemoryLoader {
    source: Source,
    declared_len: Option<usize>,
}

impl InMemoryLoader {
    /// Serves prebuilt batches in order.
    pub fn new(batches: Vec<Batch>) -> InMemoryLoader {
        InMemoryLoader { source: Source::Batches(batches), declared_len: None }
    }

    /// Groups samples into mini-batches of `batch_size` (the last one may be
    /// shorter). With `shuffle`, every pass draws a new sample order. Each
    /// batch carries `meta.ids` holding the original sample indices.
    pub fn from_samples(
        inputs: Vec<Vec<f64>>,
        targets: Vec<Vec<f64>>,
        batch_size: usize,
        shuffle: bool,
    ) -> Result<InMemoryLoader> {
        if inputs.len() != targets.len() {
            return Err(TrainError::Shape(format!(
                "{} inputs but {} targets",
                inputs.len(),
                targets.len()
            )));
        }
        if batch_size == 0 {
            return Err(TrainError::Config("batch_size must be at least 1".into()));
        }
        Ok(InMemoryLoader {
            source: Source::Samples { inputs, targets, batch_size, shuffle },
            declared_len: None,
        })
    }

    /// Overrides the length reported to the runner.
    pub fn with_declared_len(mut self, len: usize) -> InMemoryLoader {
        self.declared_len = Some(len);
        self
    }

    fn natural_len(&self) -> usize {
        match &self.source {
            Source::Batches(batches) => batches.len(),
            Source::Samples { inputs, batch_size, .. } => inputs.len().div_ceil(*batch_size),
        }
    }
}

/// Rank `rank`'s interleaved share of `items` out of `world_size` ranks.
///
/// Trailing items that would leave ranks with unequal counts are dropped, so
/// every rank sees the same number of samples and batches and reaches each
/// collective the same number of times.
pub fn shard<T: Clone>(items: &[T], rank: usize, world_size: usize) -> Vec<T> {
    let world_size = world_size.max(1);
    let usable = items.len() / world_size * world_size;
    items[..usable].iter().skip(rank).step_by(world_size).cloned().collect()
}

fn build_batch(inputs: &[Vec<f64>], targets: &[Vec<f64>], indices: &[usize]) -> Batch {
    let x = Matrix::from_data(indices.iter().map(|&i| inputs[i].clone()).collect());
    let y = Matrix::from_data(indices.iter().map(|&i| targets[i].clone()).collect());
    let fields = BTreeMap::from([
        (INPUT.to_string(), Tensor::new(x)),
        (TARGET.to_string(), Tensor::new(y)),
    ]);
    Batch::from_parts(fields, Some(json!({ "ids": indices })))
}

impl DataLoader for InMemoryLoader {
    fn len(&self) -> usize {
        self.declared_len.unwrap_or_else(|| self.natural_len())
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Batch> + '_> {
        match &self.source {
            Source::Batches(batches) => Box::new(batches.iter().cloned()),
            Source::Samples { inputs, targets, batch_size, shuffle } => {
                let mut order: Vec<usize> = (0..inputs.len()).collect();
                if *shuffle {
                    order.shuffle(&mut rand::thread_rng());
                }
                let chunks: Vec<Vec<usize>> = order.chunks(*batch_size).map(<[usize]>::to_vec).collect();
                Box::new(chunks.into_iter().map(move |idx| build_batch(inputs, targets, &idx)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor() -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        (
            vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.5, 0.5]],
            vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0], vec![0.5]],
        )
    }

    #[test]
    fn batches_cover_every_sample_once() {
        let (x, y) = xor();
        let loader = InMemoryLoader::from_samples(x, y, 2, true).unwrap();
        assert_eq!(loader.len(), 3);

        let sizes: Vec<usize> = loader.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let mut ids: Vec<String> = loader.iter().flat_map(|b| b.meta_ids().unwrap()).collect();
        ids.sort();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn declared_len_overrides_natural_len() {
        let (x, y) = xor();
        let loader = InMemoryLoader::from_samples(x, y, 1, false).unwrap().with_declared_len(2);
        assert_eq!(loader.len(), 2);
        assert_eq!(loader.iter().count(), 5);
    }

    #[test]
    fn batches_carry_input_and_target() {
        let (x, y) = xor();
        let loader = InMemoryLoader::from_samples(x, y, 2, false).unwrap();
        for batch in loader.iter() {
            assert_eq!(batch.input().unwrap().rows(), batch.get(TARGET).unwrap().rows());
            assert_eq!(batch.input().unwrap().cols(), 2);
        }
    }

    #[test]
    fn shards_are_equal_sized_and_disjoint() {
        let items: Vec<usize> = (0..9).collect();
        let a = shard(&items, 0, 2);
        let b = shard(&items, 1, 2);
        assert_eq!(a, vec![0, 2, 4, 6]);
        assert_eq!(b, vec![1, 3, 5, 7]);

        let sizes: Vec<usize> = (0..4).map(|r| shard(&items, r, 4).len()).collect();
        assert_eq!(sizes, vec![2, 2, 2, 2]);
        assert!(shard(&items, 0, 10).is_empty());
    }

    #[test]
    fn rejects_bad_construction() {
        let (x, mut y) = xor();
        assert!(InMemoryLoader::from_samples(x.clone(), y.clone(), 0, false).is_err());
        y.pop();
        assert!(InMemoryLoader::from_samples(x, y, 2, false).is_err());
    }
}
