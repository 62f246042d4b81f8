//! Header policy subsystem.
//!
//! # Data Flow
//! ```text
//! Resolution (package, mount, relative path)
//!     → policy.rs (select and order applicable rules)
//!     → set.rs (case-insensitive merge)
//!     → HeaderSet applied to the outgoing response
//! ```

pub mod policy;
pub mod set;

pub use policy::headers_for;
pub use set::{HeaderError, HeaderSet};
