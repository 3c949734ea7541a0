pub mod memory;

pub use memory::{CacheStats, OpinionCache};
