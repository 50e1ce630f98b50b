//! Versioned response cache.
//!
//! A cache storage holds any number of named namespaces; the interceptor only
//! ever writes to the one named by its configuration and deletes the rest on
//! activation.
//!
//! Two backends are provided:
//! - [`SqliteCacheStorage`]: persistent, one database file for all namespaces
//! - [`MemoryCacheStorage`]: process-local, used for tests and `--memory` runs

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryCacheStorage;
pub use sqlite::SqliteCacheStorage;
pub use traits::{CacheStats, CacheStorage, NamespaceMeta};
