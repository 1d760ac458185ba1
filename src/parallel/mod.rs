pub mod distributed;
pub mod placement;
pub mod process_group;
pub mod replicated;

pub use distributed::DistributedParallel;
pub use placement::{Parallel, Placement};
pub use process_group::{LocalProcessGroup, ProcessGroup};
pub use replicated::ReplicatedParallel;
