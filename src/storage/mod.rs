//! Storage backends
//!
//! All graph access goes through the `GraphStore` / `GraphTransaction`
//! transaction port. `SqliteStore` is the persistent backend; `MemoryStore`
//! honours the same contract in memory.

mod memory;
mod sqlite;
mod traits;

pub use memory::{MemoryStore, MemoryTransaction};
pub use sqlite::{SqliteStore, SqliteTransaction};
pub use traits::{
    GraphStore, GraphTransaction, OpenStore, RecordFilter, StorageError, StorageResult, TransactionScope,
};
