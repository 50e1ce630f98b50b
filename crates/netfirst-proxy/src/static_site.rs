//! Static dev server for the page itself.
//!
//! Serves a directory the way a PWA needs during development: manifests get
//! the manifest MIME type and the worker script is never cached by the browser,
//! so a new worker version is picked up on the next load.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
    Router,
};
use netfirst_core::DevServerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Settings for the static server.
#[derive(Debug, Clone)]
pub struct StaticSiteConfig {
    pub root: PathBuf,
    /// File name of the worker script that must bypass the browser cache.
    pub worker_script: String,
}

impl StaticSiteConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            worker_script: DevServerConfig::WORKER_SCRIPT.to_string(),
        }
    }
}

/// Build the static site router.
pub fn router(config: StaticSiteConfig) -> Router {
    let serve_dir = ServeDir::new(&config.root);
    let config = Arc::new(config);

    // Let pages on other dev ports load assets from here
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .fallback_service(serve_dir)
        .layer(middleware::from_fn_with_state(config, pwa_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn pwa_headers(
    State(config): State<Arc<StaticSiteConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;
    let found = response.status().is_success();
    let headers = response.headers_mut();

    let is_manifest = path
        .rsplit_once('.')
        .map(|(_, ext)| {
            DevServerConfig::MANIFEST_EXTENSIONS
                .iter()
                .any(|m| ext.eq_ignore_ascii_case(m))
        })
        .unwrap_or(false);
    if is_manifest && found {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(DevServerConfig::MANIFEST_MIME),
        );
    }

    if path.ends_with(&config.worker_script) {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }

    response
}

/// Start the static server. Returns the bound address.
pub async fn start_static_server(
    config: StaticSiteConfig,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let root = config.root.clone();
    let app = router(config);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Serving {} on {}", root.display(), actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Static server error: {}", e);
        }
    });

    Ok(actual_addr)
}
