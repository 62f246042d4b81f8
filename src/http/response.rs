//! Response construction.
//!
//! # Responsibilities
//! - Attach header policy output to file responses
//! - Plain 404 for content misses (introspection has its own JSON errors)
//! - Permanent redirect from a directory to its trailing-slash form
//! - Built-in landing page listing installed packages
//!
//! # Design Decisions
//! - Policy headers are added only to successful and 3xx responses, so a
//!   404 from the transport never advertises a package's headers

use axum::{
    http::{header, HeaderValue, Response as HttpResponse, StatusCode},
    response::{Html, IntoResponse, Response},
};

use crate::headers::HeaderSet;
use crate::package::registry::RegistrySnapshot;

/// Value of the `Server` header on every response.
pub const SERVER_NAME: &str = concat!("capsium-router/", env!("CARGO_PKG_VERSION"));

/// Merge policy headers into a transport response.
pub fn with_policy_headers<B>(response: HttpResponse<B>, headers: &HeaderSet) -> HttpResponse<B> {
    let status = response.status();
    if !(status.is_success() || status.is_redirection()) {
        return response;
    }
    let mut response = response;
    headers.apply_to(response.headers_mut());
    response
}

pub fn not_found() -> Response {
    let mut response = (StatusCode::NOT_FOUND, "Not Found").into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// 301 to `location`, keeping the request's query string.
pub fn moved_permanently(location: &str, query: Option<&str>) -> Response {
    let location = match query {
        Some(query) => format!("{location}?{query}"),
        None => location.to_string(),
    };
    let Ok(value) = HeaderValue::from_str(&location) else {
        return not_found();
    };
    let mut response = StatusCode::MOVED_PERMANENTLY.into_response();
    response.headers_mut().insert(header::LOCATION, value);
    response
}

/// HTML page linking every package's default mount.
pub fn landing_page(snapshot: &RegistrySnapshot) -> Response {
    let mut items = String::new();
    for package in snapshot.packages() {
        let prefix = package.manifest().default_mount().prefix.to_string();
        items.push_str(&format!(
            "      <li><a href=\"{prefix}\">{}</a> {}</li>\n",
            package.name(),
            package.version()
        ));
    }
    if items.is_empty() {
        items.push_str("      <li>No packages installed</li>\n");
    }

    let body = format!(
        "<!DOCTYPE html>\n<html>\n  <head>\n    <meta charset=\"utf-8\">\n    <title>Capsium Package Router</title>\n  </head>\n  <body>\n    <h1>Capsium Package Router</h1>\n    <ul>\n{items}    </ul>\n  </body>\n</html>\n"
    );
    Html(body).into_response()
}
