//! Netfirst Core - network-first response caching with offline fallback.
//!
//! A [`ServiceWorker`] sits between a page and the network. Every request goes
//! to the network first; successful same-origin or CORS `200` responses are
//! copied into a versioned cache namespace in the background. When the network
//! fails, the last stored response for the same request is served instead.
//!
//! This crate has no HTTP server of its own. See the `netfirst-proxy` crate for
//! a host that runs the worker in front of an upstream origin.
//!
//! # Example
//!
//! ```rust,ignore
//! use netfirst_core::{
//!     ClientRegistry, FetchOutcome, HttpFetcher, Request, ServiceWorker,
//!     SqliteCacheStorage, WorkerConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> netfirst_core::Result<()> {
//!     let worker = ServiceWorker::new(
//!         WorkerConfig::new("birthday-manager-v1")?,
//!         Arc::new(SqliteCacheStorage::new("cache.sqlite")?),
//!         Arc::new(HttpFetcher::new(None)?),
//!         Arc::new(ClientRegistry::new()),
//!     );
//!     worker.install().await?;
//!     worker.activate().await?;
//!
//!     let request = Request::get("http://localhost:8000/style.css")?;
//!     match worker.handle_fetch(&request).await {
//!         FetchOutcome::Respond(response) => println!("{} bytes", response.body.len()),
//!         FetchOutcome::Passthrough | FetchOutcome::Unfulfilled => {}
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod network;
pub mod worker;

// Re-export commonly used types
pub use cache::{CacheStats, CacheStorage, MemoryCacheStorage, NamespaceMeta, SqliteCacheStorage};
pub use config::{CacheDefaults, DevServerConfig, NetworkConfig, WorkerConfig};
pub use error::{NetfirstError, Result};
pub use http::{Request, RequestKey, Response, ResponseType};
pub use network::{classify_response, Fetcher, HttpFetcher};
pub use worker::{
    ActivationReport, ClientId, ClientRegistry, FetchOutcome, ServiceWorker, WorkerState,
    WorkerStatus,
};

// Hosts build requests from these without depending on reqwest directly
pub use reqwest::Method;
pub use url::Url;
