pub mod batch;
pub mod loader;

pub use batch::{Batch, INPUT, META};
pub use loader::{shard, DataLoader, InMemoryLoader, TARGET};
