//! Network fetcher trait and reqwest implementation.
//!
//! A fetcher answers one question: what does the network return for this
//! request right now. Any HTTP status is a successful fetch; only transport
//! failures (connect, DNS, timeout, truncated body) are errors.

use super::classify::classify_response;
use crate::config::NetworkConfig;
use crate::error::{NetfirstError, Result};
use crate::http::{Request, Response};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Source of live responses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform a single network attempt for the request.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Fetcher backed by a reqwest client.
pub struct HttpFetcher {
    client: Client,
    /// Origin responses are classified against.
    page_origin: Option<Url>,
    /// Per-request timeout.
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new(page_origin: Option<Url>) -> Result<Self> {
        Self::with_timeout(page_origin, NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a fetcher with a custom timeout.
    pub fn with_timeout(page_origin: Option<Url>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| NetfirstError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            page_origin,
            timeout,
        })
    }

    fn map_send_error(&self, request: &Request, err: reqwest::Error) -> NetfirstError {
        if err.is_timeout() {
            NetfirstError::Timeout(self.timeout)
        } else {
            NetfirstError::Network {
                message: format!("{} {} failed: {}", request.method, request.url, err),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_send_error(request, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(request, e))?;

        let response_type = classify_response(self.page_origin.as_ref(), &final_url, &headers);
        debug!(
            "{} {} -> {} ({}, {} bytes)",
            request.method,
            request.url,
            status,
            response_type,
            body.len()
        );

        Ok(Response {
            status,
            response_type,
            headers,
            body,
        })
    }
}
