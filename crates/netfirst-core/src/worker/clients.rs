//! Open client contexts and which worker version controls them.

use crate::error::{NetfirstError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use url::Url;
use uuid::Uuid;

/// Identifier of a client context (a page, tab or peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    /// Cache name of the worker controlling this client, if any.
    pub controller: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    clients: HashMap<ClientId, Client>,
    /// Worker version that has claimed clients; new clients start under it.
    active_controller: Option<String>,
}

/// Registry of open clients, shared between the host and the worker.
#[derive(Default)]
pub struct ClientRegistry {
    inner: RwLock<Registry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Registry>> {
        self.inner
            .read()
            .map_err(|e| NetfirstError::Other(format!("Client registry lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Registry>> {
        self.inner
            .write()
            .map_err(|e| NetfirstError::Other(format!("Client registry lock poisoned: {}", e)))
    }

    /// Register a new client.
    ///
    /// Once a worker has claimed clients, later clients are controlled by it
    /// from the start.
    pub fn register(&self, url: Url) -> Result<ClientId> {
        let mut registry = self.write()?;
        let client = Client {
            id: ClientId::new(),
            url,
            controller: registry.active_controller.clone(),
            registered_at: Utc::now(),
        };
        let id = client.id;
        registry.clients.insert(id, client);
        Ok(id)
    }

    /// Remove a client. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ClientId) -> Result<bool> {
        Ok(self.write()?.clients.remove(&id).is_some())
    }

    pub fn get(&self, id: ClientId) -> Result<Option<Client>> {
        Ok(self.read()?.clients.get(&id).cloned())
    }

    /// Take control of every open client for `version`.
    ///
    /// Returns how many clients changed controller.
    pub fn claim(&self, version: &str) -> Result<usize> {
        let mut registry = self.write()?;
        registry.active_controller = Some(version.to_string());

        let mut changed = 0;
        for client in registry.clients.values_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Number of clients controlled by `version`.
    pub fn controlled_count(&self, version: &str) -> Result<usize> {
        Ok(self
            .read()?
            .clients
            .values()
            .filter(|c| c.controller.as_deref() == Some(version))
            .count())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.clients.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
