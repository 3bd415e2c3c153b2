//! HTTPS server module.
//!
//! The server includes:
//! - TLS with SNI certificate selection across any number of cert/key pairs
//! - Static file serving with gzip for text-like content types
//! - Graceful shutdown on SIGTERM/SIGINT

pub mod compression;
pub mod server;
pub mod shutdown;
pub mod static_files;
pub mod tls;

pub use server::{start_server, HttpsServer, LifecycleState, ServerError};
pub use shutdown::ShutdownReason;
