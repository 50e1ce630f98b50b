//! Network access for the interceptor.
//!
//! This module provides:
//! - The [`Fetcher`] abstraction over "go to the network once"
//! - A reqwest-backed [`HttpFetcher`]
//! - Basic / cors / opaque response classification

mod classify;
mod client;

pub use classify::classify_response;
pub use client::{Fetcher, HttpFetcher};
