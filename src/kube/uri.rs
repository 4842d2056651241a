//! Request path → API surface resolution.
//!
//! # Rules (checked in order)
//! - `/api`            → (core, "")
//! - `/api/...`        → (core, v1)
//! - `/apis`           → (apis, "")
//! - `/apis/g/v/...`   → (g, v); fewer than three segments is malformed
//! - anything else     → not supported

use std::fmt;
use thiserror::Error;

const MIN_APIS_SEGMENTS: usize = 3;

/// Errors produced while resolving a request path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UriError {
    /// The path is under `/apis/` but lacks a group or version.
    #[error("uri has less than 3 parts in it: '{0}'")]
    Malformed(String),

    /// The path is outside the API server surface.
    #[error("uri is not supported: '{0}'")]
    NotSupported(String),
}

/// The (group, version) pair identifying a routable backend namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiSurface {
    pub group: String,
    pub version: String,
}

impl ApiSurface {
    /// Create a surface key.
    pub fn new(group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
        }
    }

    /// Base path of this surface on the API server.
    pub fn api_path(&self) -> String {
        match (self.group.as_str(), self.version.as_str()) {
            ("core", "") => "/api".to_string(),
            ("core", version) => format!("/api/{}", version),
            ("apis", "") => "/apis".to_string(),
            (group, version) => format!("/apis/{}/{}", group, version),
        }
    }
}

impl fmt::Display for ApiSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.group)
        } else {
            write!(f, "{}/{}", self.group, self.version)
        }
    }
}

/// Resolve the API surface addressed by a request path.
pub fn resolve(path: &str) -> Result<ApiSurface, UriError> {
    if path == "/api" {
        return Ok(ApiSurface::new("core", ""));
    }

    if path.starts_with("/api/") {
        return Ok(ApiSurface::new("core", "v1"));
    }

    if path == "/apis" {
        return Ok(ApiSurface::new("apis", ""));
    }

    if path.starts_with("/apis/") {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();

        if parts.len() < MIN_APIS_SEGMENTS {
            return Err(UriError::Malformed(path.to_string()));
        }

        return Ok(ApiSurface::new(parts[1], parts[2]));
    }

    Err(UriError::NotSupported(path.to_string()))
}
