//! Capsium package router library.

pub mod config;
pub mod headers;
pub mod http;
pub mod introspection;
pub mod lifecycle;
pub mod observability;
pub mod package;
pub mod routing;

pub use config::schema::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use package::PackageRegistry;
