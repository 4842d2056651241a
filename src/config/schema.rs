//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Connection settings for the backend API server.
    pub backend: BackendConfig,

    /// CORS response headers.
    pub cors: CorsConfig,

    /// Request body filtering rules.
    pub body_filter: BodyFilterConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    /// This is the only deadline applied to the backend call.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Backend API server connection settings.
///
/// When `host` is unset the gateway reads `kubeconfig`, falling back to the
/// in-cluster service account.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the API server (e.g., "https://127.0.0.1:6443").
    pub host: Option<String>,

    /// Bearer token sent on every backend request.
    pub token: Option<String>,

    /// File to read the bearer token from.
    pub token_file: Option<String>,

    /// Basic auth username.
    pub username: Option<String>,

    /// Basic auth password.
    pub password: Option<String>,

    /// PEM bundle used to verify the API server certificate.
    pub ca_file: Option<String>,

    /// Skip TLS verification of the API server (development only).
    pub insecure_skip_tls_verify: bool,

    /// Kubeconfig file used when `host` is unset.
    pub kubeconfig: Option<String>,
}

/// CORS header configuration.
///
/// `None` lists fall back to the middleware defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable the CORS middleware.
    pub enabled: bool,

    /// Allowed origins (default: `["*"]`).
    pub allow_origins: Option<Vec<String>>,

    /// Allowed methods (default: `*`).
    pub allow_methods: Option<Vec<String>>,

    /// Allowed request headers (default: `Origin, Content-Type, Accept`).
    pub allow_headers: Option<Vec<String>>,

    /// Whether credentials are allowed.
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_origins: None,
            allow_methods: None,
            allow_headers: None,
            allow_credentials: false,
        }
    }
}

/// Body filter middleware configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BodyFilterConfig {
    /// Enable the body filter middleware.
    pub enabled: bool,

    /// Ordered rules; the first matching rule wins.
    pub rules: Vec<FilterRuleConfig>,
}

/// A single body filter rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FilterRuleConfig {
    /// Uppercase HTTP methods the rule applies to.
    pub methods: Vec<String>,

    /// Path matchers; any match selects the rule.
    pub paths: Vec<FilterPathConfig>,

    /// JSON template describing which fields pass through.
    pub filter: String,
}

/// A path matcher of a filter rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FilterPathConfig {
    /// Pattern matched against the request path.
    pub path: String,

    /// Matcher type. Only `glob` is supported.
    #[serde(rename = "type", default = "default_path_type")]
    pub kind: String,
}

fn default_path_type() -> String {
    "glob".to_string()
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
