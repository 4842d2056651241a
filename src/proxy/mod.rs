//! Proxying subsystem.
//!
//! # Data Flow
//! ```text
//! Filtered inbound request
//!     → engine.rs (resolve surface, obtain client, replay request)
//!     → backend response (status + raw body)
//!     → transform.rs (optional, selected by query parameter)
//!     → client response
//! ```

pub mod engine;
pub mod transform;

pub use engine::ProxyEngine;
pub use transform::{JqTransformer, ResponseTransformer, TransformError, TransformOptions, TransformerSet};
