//! Centralized configuration for netfirst.
//!
//! Constant groups hold defaults; [`WorkerConfig`] carries the values a single
//! interceptor instance is built with.

use crate::error::{NetfirstError, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const USER_AGENT: &'static str = "netfirst/0.1";
}

/// Cache storage defaults.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const DEFAULT_CACHE_NAME: &'static str = "birthday-manager-v1";
    pub const DATA_DIR_NAME: &'static str = "netfirst";
    pub const DB_FILE_NAME: &'static str = "cache.sqlite";

    /// Default on-disk location of the cache database.
    ///
    /// Falls back to the current directory when the platform has no local data dir.
    pub fn default_db_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::DATA_DIR_NAME)
            .join(Self::DB_FILE_NAME)
    }
}

/// Static dev server defaults.
pub struct DevServerConfig;

impl DevServerConfig {
    pub const PORT: u16 = 8000;
    pub const WORKER_SCRIPT: &'static str = "sw.js";
    pub const MANIFEST_MIME: &'static str = "application/manifest+json";
    pub const MANIFEST_EXTENSIONS: [&'static str; 2] = ["json", "webmanifest"];
}

/// Configuration for one interceptor instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Name of the live cache namespace. Every other namespace is deleted on activate.
    pub cache_name: String,
    /// Origin of the page being served, used to classify responses as
    /// basic, cors or opaque. `None` treats every response as same-origin.
    pub page_origin: Option<Url>,
}

impl WorkerConfig {
    /// Create a config for the given cache namespace.
    pub fn new(cache_name: impl Into<String>) -> Result<Self> {
        let cache_name = cache_name.into();
        if cache_name.trim().is_empty() {
            return Err(NetfirstError::Config {
                message: "cache name must not be empty".to_string(),
            });
        }

        Ok(Self {
            cache_name,
            page_origin: None,
        })
    }

    /// Set the page origin used for response classification.
    pub fn with_page_origin(mut self, origin: Url) -> Self {
        self.page_origin = Some(origin);
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: CacheDefaults::DEFAULT_CACHE_NAME.to_string(),
            page_origin: None,
        }
    }
}
