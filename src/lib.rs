//! Cloud Connector Library
//!
//! Webhook dispatch with transparent OAuth2 client-credentials token
//! acquisition and caching, plus the configuration, logging and metrics glue
//! used by the `cloud-connector` binary.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod webhooks;

pub use webhooks::{Auth, DispatchError, DispatchOptions, Dispatcher, TokenCache, Webhook};
