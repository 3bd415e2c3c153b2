//! Handler chain for the HTTPS server.
//!
//! Requests flow through three layers, outermost first:
//! request logging (optional), gzip compression, static file serving.

use axum::{middleware, Router};

use crate::config::AppConfig;
use crate::http::compression::compression_layer;
use crate::http::static_files::create_static_service;
use crate::middleware::request_log_layer;

/// Creates the Axum router serving the configured directory.
pub fn create_router(config: &AppConfig) -> Router {
    let router = Router::new()
        .fallback_service(create_static_service(&config.dir))
        .layer(compression_layer());

    if config.request_log_enabled() {
        router.layer(middleware::from_fn(request_log_layer))
    } else {
        router
    }
}
