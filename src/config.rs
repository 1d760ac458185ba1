use serde::{Serialize, Deserialize};

use crate::error::{Result, TrainError};
use crate::network::spec::NetworkSpec;
use crate::tensor::Device;

/// `TRAIN` section of a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct TrainSection {
    /// One process (rank) per device with gradient all-reduce.
    pub distribute: bool,
    /// Drop the data/net timings from progress lines.
    pub hide_data_time: bool,
    /// Per-device share of each batch under replication. Empty splits evenly.
    pub chunk_sizes: Vec<usize>,
    pub batch_size: usize,
    pub epochs: usize,
    /// Validate every N training epochs; 0 disables validation.
    pub val_intervals: usize,
    pub lr: f64,
    pub momentum: f64,
}

impl Default for TrainSection {
    fn default() -> Self {
        TrainSection {
            distribute: false,
            hide_data_time: false,
            chunk_sizes: Vec::new(),
            batch_size: 32,
            epochs: 10,
            val_intervals: 1,
            lr: 0.1,
            momentum: 0.0,
        }
    }
}

/// Immutable settings for one run, keyed the way run files spell them
/// (`TASK`, `EXP_ID`, `GPUS`, `PRINT_FREQ`, `DEBUG`, `TRAIN.*`, `MODEL`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Config {
    pub task: String,
    pub exp_id: String,
    /// Device ids; empty runs on the host.
    pub gpus: Vec<usize>,
    /// Print a plain progress line every N iterations; ≤ 0 draws a bar instead.
    pub print_freq: i64,
    /// Debug level; > 0 calls `Task::debug` every iteration.
    pub debug: u32,
    pub train: TrainSection,
    pub model: NetworkSpec,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            task: "classification".into(),
            exp_id: "default".into(),
            gpus: Vec::new(),
            print_freq: 0,
            debug: 0,
            train: TrainSection::default(),
            model: NetworkSpec::default(),
        }
    }
}

impl Config {
    /// Loads and validates a JSON run file. Missing keys take their defaults.
    pub fn load_json(path: &str) -> Result<Config> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let chunks = &self.train.chunk_sizes;
        if !chunks.is_empty() && chunks.len() != self.devices().len() {
            return Err(TrainError::Config(format!(
                "TRAIN.CHUNK_SIZES has {} entries for {} devices",
                chunks.len(),
                self.devices().len()
            )));
        }
        if self.train.batch_size == 0 {
            return Err(TrainError::Config("TRAIN.BATCH_SIZE must be at least 1".into()));
        }
        if !(self.train.lr > 0.0) {
            return Err(TrainError::Config(format!("TRAIN.LR must be positive, got {}", self.train.lr)));
        }
        if !(0.0..1.0).contains(&self.train.momentum) {
            return Err(TrainError::Config(format!("TRAIN.MOMENTUM must be in [0, 1), got {}", self.train.momentum)));
        }
        let mut seen = self.gpus.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.gpus.len() {
            return Err(TrainError::Config("GPUS contains duplicate ids".into()));
        }
        self.model.validate()
    }

    /// Configured devices; host only when `GPUS` is empty.
    pub fn devices(&self) -> Vec<Device> {
        Device::from_gpus(&self.gpus)
    }

    /// Device that owns results and optimizer state for `local_rank`.
    pub fn primary_device(&self, local_rank: usize) -> Device {
        let devices = self.devices();
        if self.train.distribute {
            devices.get(local_rank).copied().unwrap_or(devices[0])
        } else {
            devices[0]
        }
    }

    /// `TASK/EXP_ID`, the prefix of every progress line.
    pub fn label(&self) -> String {
        format!("{}/{}", self.task, self.exp_id)
    }
}
