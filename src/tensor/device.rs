use std::fmt;

use serde::{Serialize, Deserialize};

/// Logical compute device a tensor lives on.
///
/// The host backend keeps every buffer in main memory; the tag is what
/// placement, transfers and device checks operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Gpu(usize),
}

impl Device {
    /// Maps a configured GPU id list to devices. No ids means host execution.
    pub fn from_gpus(gpus: &[usize]) -> Vec<Device> {
        if gpus.is_empty() {
            vec![Device::Cpu]
        } else {
            gpus.iter().map(|&id| Device::Gpu(id)).collect()
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Device::Cpu => None,
            Device::Gpu(id) => Some(*id),
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(id) => write!(f, "gpu:{id}"),
        }
    }
}
