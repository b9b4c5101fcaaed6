pub mod checkpoint;
pub mod recompute;

pub use checkpoint::{CheckpointStore, MemoryCheckpoints};
pub use recompute::{RecomputeJob, RecomputeMode};
