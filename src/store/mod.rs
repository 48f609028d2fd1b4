//! Persistence layer for task records.

pub mod memory;
pub mod traits;

pub use memory::InMemoryTaskStore;
pub use traits::TaskStore;
