//! Storage backends.

pub mod memory_store;
pub mod sqlite_vec_loader;

pub use memory_store::{MAX_KNN_K, MemoryStore, SqliteMemoryStore, StoreFuture};
pub use sqlite_vec_loader::init_sqlite_vec_extension;
