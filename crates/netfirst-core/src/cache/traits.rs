//! Cache storage trait and types.

use crate::error::Result;
use crate::http::{RequestKey, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about a cache namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceMeta {
    /// Namespace name.
    pub namespace: String,
    /// Number of entries in this namespace.
    pub entry_count: usize,
    /// Total size of all stored bodies in bytes.
    pub total_size_bytes: u64,
    /// When the namespace was first opened.
    pub created_at: DateTime<Utc>,
    /// When an entry was last written.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Cache statistics across all namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of entries across all namespaces.
    pub total_entries: usize,
    /// Total size of all stored bodies in bytes.
    pub total_size_bytes: u64,
    /// Number of namespaces.
    pub namespace_count: usize,
    /// Per-namespace statistics, in creation order.
    pub namespaces: Vec<NamespaceMeta>,
}

impl CacheStats {
    pub(crate) fn from_namespaces(namespaces: Vec<NamespaceMeta>) -> Self {
        Self {
            total_entries: namespaces.iter().map(|n| n.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|n| n.total_size_bytes).sum(),
            namespace_count: namespaces.len(),
            namespaces,
        }
    }
}

/// Named, versioned response store.
///
/// # Concurrency
///
/// Implementations must make every per-key read and write atomic with
/// read-your-writes semantics: once `put` returns, a `match_request` for the
/// same key from any thread sees that response (or a later one). Callers share
/// one storage across tasks without any coordination of their own.
///
/// All operations are synchronous to match rusqlite's API; async callers go
/// through `spawn_blocking`.
pub trait CacheStorage: Send + Sync {
    /// Names of all namespaces, in creation order.
    fn keys(&self) -> Result<Vec<String>>;

    /// Whether a namespace exists.
    fn has(&self, namespace: &str) -> Result<bool>;

    /// Create the namespace if it does not exist yet.
    fn open(&self, namespace: &str) -> Result<()>;

    /// Delete a namespace and all of its entries.
    ///
    /// Returns `false` if it did not exist.
    fn delete(&self, namespace: &str) -> Result<bool>;

    /// Store a response under a request key, creating the namespace if needed.
    ///
    /// Overwrites any existing entry with the same key.
    fn put(&self, namespace: &str, key: &RequestKey, response: &Response) -> Result<()>;

    /// Look up a response in one namespace.
    fn match_request(&self, namespace: &str, key: &RequestKey) -> Result<Option<Response>>;

    /// Look up a response across all namespaces, oldest namespace first.
    fn match_any(&self, key: &RequestKey) -> Result<Option<Response>> {
        for namespace in self.keys()? {
            if let Some(response) = self.match_request(&namespace, key)? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Request keys stored in a namespace, sorted by key.
    fn entries(&self, namespace: &str) -> Result<Vec<RequestKey>>;

    /// Remove one entry. Returns `false` if it did not exist.
    fn remove(&self, namespace: &str, key: &RequestKey) -> Result<bool>;

    /// Statistics for every namespace.
    fn stats(&self) -> Result<CacheStats>;
}
