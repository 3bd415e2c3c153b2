//! Gzip compression restricted to text-like content types.
//!
//! Binary and already-compressed formats (images, archives, fonts) are served
//! as-is; compressing them again costs CPU for no gain.

use http::header::CONTENT_TYPE;
use http::{Extensions, HeaderMap, StatusCode, Version};
use tower_http::compression::predicate::{Predicate, SizeAbove};
use tower_http::compression::CompressionLayer;

use crate::config::{COMPRESSIBLE_CONTENT_TYPES, GZIP_MIN_SIZE};

/// Whether a media type is on the compression allow-list.
///
/// Parameters such as `charset` are ignored and the comparison is
/// case-insensitive.
pub fn is_compressible(content_type: &str) -> bool {
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    COMPRESSIBLE_CONTENT_TYPES
        .iter()
        .any(|allowed| media_type.eq_ignore_ascii_case(allowed))
}

fn content_type_allowed(
    _status: StatusCode,
    _version: Version,
    headers: &HeaderMap,
    _extensions: &Extensions,
) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(is_compressible)
}

/// Gzip layer for allow-listed responses of at least `GZIP_MIN_SIZE` bytes.
pub fn compression_layer() -> CompressionLayer<impl Predicate> {
    CompressionLayer::new()
        .gzip(true)
        .compress_when(content_type_allowed.and(SizeAbove::new(GZIP_MIN_SIZE)))
}
