//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, host extraction)
//!     → /api/v1/introspect/* → introspection handlers
//!     → anything else → routing::resolve → ServeFile
//!     → response.rs (policy headers, 404, landing page)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
