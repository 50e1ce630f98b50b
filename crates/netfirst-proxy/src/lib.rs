//! Netfirst Proxy - hosts a netfirst worker in front of an upstream origin.
//!
//! Two servers live here:
//! - the offline proxy ([`server`]), which runs every page request through a
//!   network-first [`netfirst_core::ServiceWorker`]
//! - a static dev server ([`static_site`]) for serving the page's own files

pub mod handler;
pub mod server;
pub mod static_site;

pub use server::{start_server, AppState};
pub use static_site::{start_static_server, StaticSiteConfig};
