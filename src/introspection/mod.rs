//! Introspection API.
//!
//! # Endpoints
//! ```text
//! GET /api/v1/introspect/metadata          → {"packages": [...]}
//! GET /api/v1/introspect/routes            → {"routes": [...]}
//! GET /api/v1/introspect/content-hashes    → {"contentHashes": [...]}
//! GET /api/v1/introspect/content-validity  → {"contentValidity": [...]}
//! anything else under the prefix           → 404 {"error": ...}
//! ```
//!
//! Requests here never go through package resolution.

pub mod handlers;
pub mod validity;
pub mod views;

use axum::{
    routing::{any, get},
    Router,
};

use crate::http::server::AppState;
use crate::package::manifest::INTROSPECTION_PREFIX;
use self::handlers::*;

pub use handlers::IntrospectError;
pub use validity::{Validity, ValidityCache};

pub fn setup_introspection_router(state: AppState) -> Router {
    let p = INTROSPECTION_PREFIX;
    Router::new()
        .route(&format!("{p}/metadata"), get(get_metadata))
        .route(&format!("{p}/routes"), get(get_routes))
        .route(&format!("{p}/content-hashes"), get(get_content_hashes))
        .route(&format!("{p}/content-validity"), get(get_content_validity))
        .route(p, any(unknown_endpoint))
        .route(&format!("{p}/"), any(unknown_endpoint))
        .route(&format!("{p}/{{*rest}}"), any(unknown_endpoint))
        .with_state(state)
}
