pub mod epoch_stats;
pub mod fit;
pub mod fit_config;
pub mod progress;
pub mod running_stat;
pub mod task;
pub mod trainer;

pub use epoch_stats::EpochStats;
pub use fit::{fit, FitSummary};
pub use fit_config::FitConfig;
pub use progress::{Phase, Progress, Style};
pub use running_stat::RunningStat;
pub use task::{Results, Task};
pub use trainer::{BaseTrainer, EpochMetrics};
