//! API server gateway library.
//!
//! An HTTP gateway in front of a Kubernetes-style API server: requests are
//! routed per API (group, version) to lazily built backend clients, request
//! bodies can be projected through filter templates, and response bodies can
//! be post-processed with `jq` queries.

// Core subsystems
pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod kube;
pub mod proxy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ProxyEngine;
