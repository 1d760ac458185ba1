use std::sync::{Arc, Barrier, Mutex};

use crate::error::{Result, TrainError};
use crate::math::matrix::Matrix;

/// Collective communication between the ranks of one training job.
///
/// Every collective is a blocking barrier: all `world_size` ranks must call
/// it, in the same order, with buffers of matching shapes. A rank that never
/// arrives (crashed, or skipped a backward pass) stalls every peer forever;
/// there is no timeout.
pub trait ProcessGroup: Send + Sync {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Replaces each buffer with its element-wise mean across all ranks.
    fn all_reduce_mean(&self, buffers: &mut [Matrix]) -> Result<()>;

    /// Overwrites every rank's buffers with those of `root`.
    fn broadcast(&self, buffers: &mut [Matrix], root: usize) -> Result<()>;
}

struct Shared {
    barrier: Barrier,
    slots: Mutex<Vec<Vec<Matrix>>>,
}

/// In-process group: one handle per rank, each rank driven by its own thread.
pub struct LocalProcessGroup {
    rank: usize,
    world_size: usize,
    shared: Arc<Shared>,
}

impl LocalProcessGroup {
    /// Creates the handles of a `world_size`-rank group, indexed by rank.
    pub fn new_group(world_size: usize) -> Vec<LocalProcessGroup> {
        let shared = Arc::new(Shared {
            barrier: Barrier::new(world_size),
            slots: Mutex::new(vec![Vec::new(); world_size]),
        });
        (0..world_size)
            .map(|rank| LocalProcessGroup { rank, world_size, shared: Arc::clone(&shared) })
            .collect()
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, Vec<Vec<Matrix>>>> {
        self.shared.slots.lock()
            .map_err(|_| TrainError::Collective("a peer panicked while holding the group lock".into()))
    }

    fn publish(&self, buffers: &[Matrix]) -> Result<()> {
        self.slots()?[self.rank] = buffers.to_vec();
        Ok(())
    }
}

fn check_shapes(mine: &[Matrix], theirs: &[Matrix], peer: usize) -> Result<()> {
    if mine.len() != theirs.len() {
        return Err(TrainError::Collective(format!(
            "rank {peer} contributed {} buffers, expected {}",
            theirs.len(),
            mine.len()
        )));
    }
    for (a, b) in mine.iter().zip(theirs) {
        if a.rows != b.rows || a.cols != b.cols {
            return Err(TrainError::Collective(format!(
                "rank {peer} contributed a {}×{} buffer, expected {}×{}",
                b.rows, b.cols, a.rows, a.cols
            )));
        }
    }
    Ok(())
}

impl ProcessGroup for LocalProcessGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_reduce_mean(&self, buffers: &mut [Matrix]) -> Result<()> {
        self.publish(buffers)?;
        self.shared.barrier.wait();

        let result = {
            let slots = self.slots()?;
            let mut outcome = Ok(());
            for (peer, theirs) in slots.iter().enumerate() {
                if let Err(e) = check_shapes(buffers, theirs, peer) {
                    outcome = Err(e);
                    break;
                }
            }
            if outcome.is_ok() {
                let scale = 1.0 / self.world_size as f64;
                for (i, buf) in buffers.iter_mut().enumerate() {
                    let mut acc = Matrix::zeros(buf.rows, buf.cols);
                    for theirs in slots.iter() {
                        acc.add_assign(&theirs[i]);
                    }
                    *buf = acc.map(|v| v * scale);
                }
            }
            outcome
        };

        // Nobody may publish the next round until every rank has read this one.
        self.shared.barrier.wait();
        result
    }

    fn broadcast(&self, buffers: &mut [Matrix], root: usize) -> Result<()> {
        if root >= self.world_size {
            return Err(TrainError::Collective(format!("broadcast root {root} outside group")));
        }
        if self.rank == root {
            self.publish(buffers)?;
        }
        self.shared.barrier.wait();

        let result = if self.rank == root {
            Ok(())
        } else {
            let slots = self.slots()?;
            check_shapes(buffers, &slots[root], root).map(|_| {
                buffers.clone_from_slice(&slots[root]);
            })
        };

        self.shared.barrier.wait();
        result
    }
}
