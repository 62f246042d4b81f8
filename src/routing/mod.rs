//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → path.rs (normalize, reject escapes)
//!     → router.rs (walk the snapshot's sorted mount bindings)
//!     → matcher.rs (evaluate domain + prefix conditions)
//!     → Return: File, Redirect, NotFound or NoMountMatch
//! ```
//!
//! # Design Decisions
//! - Resolution reads one immutable registry snapshot per request
//! - No regex in hot path (segment prefix matching only)
//! - Deterministic: same snapshot and input always select the same file
//! - First match wins (bindings pre-sorted by specificity)

pub mod matcher;
pub mod path;
pub mod router;

pub use router::{resolve, Resolution, ResolveError, Target};
