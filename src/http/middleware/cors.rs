//! CORS response headers.
//!
//! Four headers are set on every response, whatever the inner layers
//! produced. Preflight requests are not answered here; they are proxied like
//! any other request.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use url::Url;

use crate::config::CorsConfig;

const WILDCARD: &str = "*";
const DEFAULT_ALLOW_HEADERS: [&str; 3] = ["Origin", "Content-Type", "Accept"];

/// Resolved CORS policy.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origins: Vec<String>,
    allow_methods: String,
    allow_headers: String,
    allow_credentials: bool,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        let allow_origins = config
            .allow_origins
            .clone()
            .unwrap_or_else(|| vec![WILDCARD.to_string()]);

        let allow_methods = config
            .allow_methods
            .as_ref()
            .map(|methods| methods.join(", "))
            .unwrap_or_else(|| WILDCARD.to_string());

        let allow_headers = config
            .allow_headers
            .as_ref()
            .map(|headers| headers.join(", "))
            .unwrap_or_else(|| DEFAULT_ALLOW_HEADERS.join(", "));

        Self {
            allow_origins,
            allow_methods,
            allow_headers,
            allow_credentials: config.allow_credentials,
        }
    }

    /// Value of `Access-Control-Allow-Origin` for a request `Origin`.
    ///
    /// Returns an empty string when the origin is not allowed.
    pub fn allow_origin(&self, origin: Option<&str>) -> String {
        if self.allow_origins.len() == 1 && self.allow_origins[0] == WILDCARD {
            return WILDCARD.to_string();
        }

        let origin = origin.unwrap_or_default();
        if self.allow_origins.iter().any(|allowed| allowed == origin) {
            return origin.to_string();
        }

        let Ok(requested) = Url::parse(origin) else {
            return String::new();
        };

        self.allow_origins
            .iter()
            .filter_map(|allowed| Url::parse(allowed).ok())
            .find(|allowed| {
                allowed.scheme() == requested.scheme()
                    && allowed.host_str() == requested.host_str()
                    && allowed.port() == requested.port()
            })
            .map(|allowed| origin_of(&allowed))
            .unwrap_or_default()
    }

    /// Write the four CORS headers into `headers`.
    pub fn apply(&self, origin: Option<&str>, headers: &mut HeaderMap) {
        let allow_origin = self.allow_origin(origin);

        let values = [
            (header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.as_str()),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin.as_str()),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.as_str()),
            (
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                if self.allow_credentials { "true" } else { "false" },
            ),
        ];

        for (name, value) in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(_) => tracing::warn!(header = %name, value = %value, "Invalid CORS header value"),
            }
        }
    }
}

/// `scheme://host[:port]`, dropping user-info and path.
fn origin_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Axum middleware adding CORS headers to every response.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;
    policy.apply(origin.as_deref(), response.headers_mut());
    response
}
