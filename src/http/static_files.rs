//! Static file serving from the public directory.
//!
//! Path traversal protection, `index.html` lookup, range and conditional
//! requests, and content types are all handled by `ServeDir`.

use std::path::Path;

use tower_http::services::ServeDir;

/// Create the static file service rooted at `dir`.
///
/// Requests for a directory are answered with its `index.html`; a directory
/// requested without a trailing slash is redirected to the slashed form.
pub fn create_static_service(dir: &Path) -> ServeDir {
    ServeDir::new(dir).append_index_html_on_directories(true)
}
