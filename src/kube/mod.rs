//! Backend API server access.
//!
//! # Data Flow
//! ```text
//! Request path
//!     → uri.rs (resolve (group, version))
//!     → registry.rs (reuse or construct the surface's client)
//!         → client.rs (ClientFactory builds a BackendClient)
//!             → settings.rs (host, credentials, CA)
//!     → BackendClient::build_request (outbound request)
//! ```
//!
//! # Design Decisions
//! - One client per (group, version), constructed lazily and kept forever
//! - Settings come from the config file, a kubeconfig, or the in-cluster
//!   service account
//! - No retries anywhere in this subsystem

pub mod client;
pub mod kubeconfig;
pub mod registry;
pub mod settings;
pub mod uri;

pub use client::{BackendClient, ClientBuildError, ClientFactory, DefaultClientFactory};
pub use registry::ClientRegistry;
pub use kubeconfig::{Kubeconfig, KubeconfigError, KubeconfigSettings};
pub use settings::{ClientIdentity, ConnectionSettings, Credentials, SettingsProvider};
pub use uri::{resolve, ApiSurface, UriError};
