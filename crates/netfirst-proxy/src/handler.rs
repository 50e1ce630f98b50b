//! Proxy request handlers.

use crate::server::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use netfirst_core::{FetchOutcome, NetfirstError, Url};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Largest request body forwarded upstream.
const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_forwardable(name: &str) -> bool {
    !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
        && !name.eq_ignore_ascii_case("content-length")
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Worker and cache status.
pub async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    let worker = match state.worker.status() {
        Ok(status) => status,
        Err(e) => return internal_error(e),
    };

    let storage = Arc::clone(state.worker.storage());
    let cache = match tokio::task::spawn_blocking(move || storage.stats()).await {
        Ok(Ok(stats)) => stats,
        Ok(Err(e)) => return internal_error(e),
        Err(e) => return internal_error(NetfirstError::from(e)),
    };

    Json(json!({
        "upstream": state.upstream.as_str(),
        "worker": worker,
        "cache": cache,
    }))
    .into_response()
}

fn internal_error(err: NetfirstError) -> Response {
    error!("Status request failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": err.to_string()})),
    )
        .into_response()
}

/// Route a page request through the worker.
pub async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    let url = match resolve_url(&state.upstream, &parts.uri) {
        Ok(url) => url,
        Err(e) => {
            debug!("Rejecting {}: {}", parts.uri, e);
            return (StatusCode::BAD_REQUEST, format!("Invalid request URL: {}", e)).into_response();
        }
    };

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read request body for {}: {}", url, e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let mut forwarded = netfirst_core::Request::new(parts.method, url).with_body(body);
    for (name, value) in &parts.headers {
        if is_forwardable(name.as_str()) {
            if let Ok(value) = value.to_str() {
                forwarded = forwarded.with_header(name.as_str(), value);
            }
        }
    }

    if let Some(ConnectInfo(addr)) = peer {
        register_peer(&state, addr.ip(), &forwarded.url);
    }

    match state.worker.handle_fetch(&forwarded).await {
        FetchOutcome::Respond(response) => into_http_response(response),
        FetchOutcome::Unfulfilled => StatusCode::GATEWAY_TIMEOUT.into_response(),
        FetchOutcome::Passthrough => passthrough(&state, &forwarded).await,
    }
}

/// Default handling for requests the worker does not intercept.
async fn passthrough(state: &AppState, request: &netfirst_core::Request) -> Response {
    if !request.is_http() {
        return (
            StatusCode::BAD_REQUEST,
            format!("Unsupported scheme: {}", request.url.scheme()),
        )
            .into_response();
    }

    match state.fetcher.fetch(request).await {
        Ok(response) => into_http_response(response),
        Err(e) => {
            warn!("Passthrough request {} failed: {}", request.url, e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Resolve the incoming request target to an absolute URL.
///
/// Absolute-form targets (forward proxy style) are used as-is; origin-form
/// paths are resolved against the upstream origin.
pub fn resolve_url(upstream: &Url, uri: &Uri) -> Result<Url, netfirst_core::NetfirstError> {
    if uri.scheme().is_some() {
        return Ok(Url::parse(&uri.to_string())?);
    }
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Ok(upstream.join(path)?)
}

/// Register the first request from each peer address as a worker client.
///
/// Entries are never removed: HTTP gives no signal that a page was closed, so
/// the peer table and the client registry grow for the life of the process.
/// That is fine for a local dev proxy with a handful of browsers.
fn register_peer(state: &AppState, ip: IpAddr, url: &Url) {
    let mut peers = match state.peers.lock() {
        Ok(peers) => peers,
        Err(e) => {
            warn!("Peer table lock poisoned: {}", e);
            return;
        }
    };
    if peers.contains_key(&ip) {
        return;
    }

    match state.worker.clients().register(url.clone()) {
        Ok(id) => {
            debug!("Registered client {} for peer {}", id, ip);
            peers.insert(ip, id);
        }
        Err(e) => warn!("Failed to register client for {}: {}", ip, e),
    }
}

fn into_http_response(response: netfirst_core::Response) -> Response {
    let mut builder = axum::http::Response::builder().status(response.status);
    for (name, value) in &response.headers {
        if is_forwardable(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    match builder.body(Body::from(response.body)) {
        Ok(response) => response,
        Err(e) => {
            warn!("Upstream response could not be relayed: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
