//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer stack)
//!     → request.rs (request ID)
//!     → middleware/cors.rs (CORS headers on every response)
//!     → filter (body projection, when enabled)
//!     → proxy engine
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
