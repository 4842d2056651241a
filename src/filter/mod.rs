//! Request body filtering.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → rules.rs (first rule matching method + path, else passthrough)
//!     → middleware.rs (buffer + decode body)
//!     → template.rs (project body through the rule template)
//!     → rewritten request → proxy handler
//! ```

pub mod middleware;
pub mod rules;
pub mod template;

pub use middleware::body_filter;
pub use rules::{BodyFilter, FilterRule, PathMatcher};
pub use template::{filter, FilterError};
