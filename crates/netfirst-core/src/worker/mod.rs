//! Interceptor lifecycle and request handling.
//!
//! A [`ServiceWorker`] goes `Parsed -> Installing -> Installed -> Activating ->
//! Activated`; only an activated worker intercepts fetches.

mod background;
mod clients;
mod interceptor;
mod lifecycle;

pub use background::BackgroundWriter;
pub use clients::{Client, ClientId, ClientRegistry};
pub use interceptor::{ActivationReport, FetchOutcome, ServiceWorker, WorkerStatus};
pub use lifecycle::WorkerState;
