//! Request and response values seen by the interceptor.
//!
//! Bodies are fully buffered [`Bytes`], so duplicating a response for the cache
//! is a cheap reference-counted clone and both copies stay readable.

use crate::error::{NetfirstError, Result};
use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// An intercepted outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// Forwarded to the network as-is; not part of the cache key.
    pub body: Bytes,
}

impl Request {
    /// Create a request with no headers.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Create a GET request from a URL string.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the request uses a scheme the interceptor handles.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Whether responses to this request may be stored or served from cache.
    ///
    /// Only `GET` qualifies. Replaying a stored answer to a write would report
    /// a change the server never saw.
    pub fn is_cacheable_method(&self) -> bool {
        self.method == Method::GET
    }

    /// Cache identity of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Cache key derived from request method and URL.
///
/// The fragment is dropped since it never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.as_str(), url))
    }

    /// Rebuild a key from its stored form.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once(' ') {
            Some((method, url)) if !method.is_empty() && Url::parse(url).is_ok() => {
                Ok(Self(raw.to_string()))
            }
            _ => Err(NetfirstError::InvalidRequest {
                message: format!("Malformed request key: {}", raw),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport classification of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response the page is allowed to read.
    Cors,
    /// Cross-origin response whose status and body cannot be verified.
    Opaque,
    /// Network error placeholder.
    Error,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Basic => "basic",
            ResponseType::Cors => "cors",
            ResponseType::Opaque => "opaque",
            ResponseType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(ResponseType::Basic),
            "cors" => Some(ResponseType::Cors),
            "opaque" => Some(ResponseType::Opaque),
            "error" => Some(ResponseType::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live or cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub response_type: ResponseType,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, response_type: ResponseType, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            response_type,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this response may be stored.
    ///
    /// Only `200` responses whose contents the page can verify qualify.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
            && matches!(self.response_type, ResponseType::Basic | ResponseType::Cors)
    }

    pub fn size_bytes(&self) -> u64 {
        self.body.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_drops_fragment() {
        let a = Request::get("https://example.com/app.js#top").unwrap();
        let b = Request::get("https://example.com/app.js").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_str(), "GET https://example.com/app.js");
    }

    #[test]
    fn test_key_includes_method() {
        let url = Url::parse("https://example.com/api").unwrap();
        let get = Request::new(Method::GET, url.clone());
        let post = Request::new(Method::POST, url);
        assert_ne!(get.key(), post.key());
    }

    #[test]
    fn test_key_parse() {
        assert!(RequestKey::parse("GET https://example.com/").is_ok());
        assert!(RequestKey::parse("garbage").is_err());
        assert!(RequestKey::parse("GET nope").is_err());
    }

    #[test]
    fn test_is_http() {
        assert!(Request::get("http://localhost/").unwrap().is_http());
        assert!(Request::get("https://localhost/").unwrap().is_http());
        assert!(!Request::get("chrome-extension://abc/page.html")
            .unwrap()
            .is_http());
    }

    #[test]
    fn test_only_get_is_cacheable_method() {
        let url = Url::parse("http://localhost:8000/api/save").unwrap();
        assert!(Request::new(Method::GET, url.clone()).is_cacheable_method());
        assert!(!Request::new(Method::POST, url.clone()).is_cacheable_method());
        assert!(!Request::new(Method::PUT, url.clone()).is_cacheable_method());
        assert!(!Request::new(Method::HEAD, url).is_cacheable_method());
    }

    #[test]
    fn test_cacheable() {
        assert!(Response::new(200, ResponseType::Basic, "ok").is_cacheable());
        assert!(Response::new(200, ResponseType::Cors, "ok").is_cacheable());
        assert!(!Response::new(200, ResponseType::Opaque, "").is_cacheable());
        assert!(!Response::new(404, ResponseType::Basic, "nope").is_cacheable());
        assert!(!Response::new(206, ResponseType::Basic, "part").is_cacheable());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response =
            Response::new(200, ResponseType::Basic, "").with_header("Content-Type", "text/css");
        assert_eq!(response.header("content-type"), Some("text/css"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_response_type_round_trip() {
        for t in [
            ResponseType::Basic,
            ResponseType::Cors,
            ResponseType::Opaque,
            ResponseType::Error,
        ] {
            assert_eq!(ResponseType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ResponseType::parse("bogus"), None);
    }
}
