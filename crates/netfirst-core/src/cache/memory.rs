//! Process-local cache storage.

use super::traits::{CacheStats, CacheStorage, NamespaceMeta};
use crate::error::{NetfirstError, Result};
use crate::http::{RequestKey, Response};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

struct Namespace {
    name: String,
    created_at: DateTime<Utc>,
    last_modified: Option<DateTime<Utc>>,
    entries: BTreeMap<RequestKey, Response>,
}

impl Namespace {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            last_modified: None,
            entries: BTreeMap::new(),
        }
    }

    fn meta(&self) -> NamespaceMeta {
        NamespaceMeta {
            namespace: self.name.clone(),
            entry_count: self.entries.len(),
            total_size_bytes: self.entries.values().map(Response::size_bytes).sum(),
            created_at: self.created_at,
            last_modified: self.last_modified,
        }
    }
}

/// In-memory cache storage.
///
/// Contents are lost when the process exits. A single `RwLock` over all
/// namespaces gives the per-key atomicity [`CacheStorage`] requires.
#[derive(Default)]
pub struct MemoryCacheStorage {
    /// Namespaces in creation order.
    namespaces: RwLock<Vec<Namespace>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Namespace>>> {
        self.namespaces
            .read()
            .map_err(|e| NetfirstError::Other(format!("Cache lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Namespace>>> {
        self.namespaces
            .write()
            .map_err(|e| NetfirstError::Other(format!("Cache lock poisoned: {}", e)))
    }

    fn get_or_create<'a>(namespaces: &'a mut Vec<Namespace>, name: &str) -> &'a mut Namespace {
        match namespaces.iter().position(|n| n.name == name) {
            Some(idx) => &mut namespaces[idx],
            None => {
                namespaces.push(Namespace::new(name));
                let last = namespaces.len() - 1;
                &mut namespaces[last]
            }
        }
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.read()?.iter().map(|n| n.name.clone()).collect())
    }

    fn has(&self, namespace: &str) -> Result<bool> {
        Ok(self.read()?.iter().any(|n| n.name == namespace))
    }

    fn open(&self, namespace: &str) -> Result<()> {
        let mut namespaces = self.write()?;
        Self::get_or_create(&mut namespaces, namespace);
        Ok(())
    }

    fn delete(&self, namespace: &str) -> Result<bool> {
        let mut namespaces = self.write()?;
        let before = namespaces.len();
        namespaces.retain(|n| n.name != namespace);
        Ok(namespaces.len() != before)
    }

    fn put(&self, namespace: &str, key: &RequestKey, response: &Response) -> Result<()> {
        let mut namespaces = self.write()?;
        let ns = Self::get_or_create(&mut namespaces, namespace);
        ns.entries.insert(key.clone(), response.clone());
        ns.last_modified = Some(Utc::now());
        Ok(())
    }

    fn match_request(&self, namespace: &str, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self
            .read()?
            .iter()
            .find(|n| n.name == namespace)
            .and_then(|n| n.entries.get(key).cloned()))
    }

    fn entries(&self, namespace: &str) -> Result<Vec<RequestKey>> {
        Ok(self
            .read()?
            .iter()
            .find(|n| n.name == namespace)
            .map(|n| n.entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn remove(&self, namespace: &str, key: &RequestKey) -> Result<bool> {
        let mut namespaces = self.write()?;
        Ok(namespaces
            .iter_mut()
            .find(|n| n.name == namespace)
            .map(|n| n.entries.remove(key).is_some())
            .unwrap_or(false))
    }

    fn stats(&self) -> Result<CacheStats> {
        let metas = self.read()?.iter().map(Namespace::meta).collect();
        Ok(CacheStats::from_namespaces(metas))
    }
}
