//! h2s: a minimal HTTPS static file server.
//!
//! Serves a directory over TLS, gzip-compresses text assets and drains
//! in-flight requests before exiting on SIGINT/SIGTERM.

pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;

pub use config::AppConfig;
pub use error::Error;
pub use crate::http::{start_server, HttpsServer, LifecycleState, ServerError, ShutdownReason};
