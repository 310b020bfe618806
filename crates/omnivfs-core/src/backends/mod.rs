//! Reference providers.

mod local;
mod memory;

pub use local::{LocalOps, LocalProvider};
pub use memory::{MemoryOps, MemoryProvider, MemoryStore};
