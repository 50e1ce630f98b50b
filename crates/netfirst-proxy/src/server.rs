//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_proxy, handle_status};
use axum::{routing::get, Router};
use netfirst_core::{ClientId, Fetcher, ServiceWorker, Url};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Path prefix reserved for the proxy's own endpoints.
pub const CONTROL_PREFIX: &str = "/__netfirst";

/// Application state shared across handlers.
pub struct AppState {
    /// The activated interceptor
    pub worker: Arc<ServiceWorker>,
    /// Network access for requests the worker does not intercept
    pub fetcher: Arc<dyn Fetcher>,
    /// Origin that relative request paths are resolved against
    pub upstream: Url,
    /// Client registered for each peer address
    pub peers: Mutex<HashMap<IpAddr, ClientId>>,
}

impl AppState {
    pub fn new(worker: Arc<ServiceWorker>, fetcher: Arc<dyn Fetcher>, upstream: Url) -> Self {
        Self {
            worker,
            fetcher,
            upstream,
            peers: Mutex::new(HashMap::new()),
        }
    }
}

/// Build the proxy router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&format!("{}/health", CONTROL_PREFIX), get(handle_health))
        .route(&format!("{}/status", CONTROL_PREFIX), get(handle_status))
        .fallback(handle_proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the proxy HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Proxy listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!("Proxy server error: {}", e);
        }
    });

    Ok(actual_addr)
}
