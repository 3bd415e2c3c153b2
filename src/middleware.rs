//! Request logging middleware.
//!
//! Logs the method and URI of every incoming request before it reaches the
//! rest of the handler chain. Each request runs inside a tracing span carrying
//! a UUID v4 request ID, so the completion event (status and duration) can be
//! correlated with the arrival event. The response is never modified.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Middleware that logs each request inside its own span.
///
/// This should be the outermost layer so the span covers compression and
/// file serving as well.
pub async fn request_log_layer(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();

    async move {
        tracing::info!("{} {}", method, uri);

        let response = next.run(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::Span::current().record("duration_ms", duration_ms);
        tracing::debug!(
            status = response.status().as_u16(),
            duration_ms,
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}
