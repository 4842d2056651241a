//! Backend clients bound to one API surface.
//!
//! # Responsibilities
//! - Build a transport for one (group, version) from global settings
//! - Negotiate JSON serialization and attach credentials
//! - Produce outbound requests that replay the inbound request target

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderValue, Method};
use reqwest::header::{self, HeaderMap};
use thiserror::Error;
use url::Url;

use crate::kube::settings::{ConnectionSettings, Credentials, SettingsProvider};
use crate::kube::uri::ApiSurface;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Errors raised while constructing a backend client.
///
/// Cloneable so every caller waiting on the same construction receives it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientBuildError {
    /// Connection settings could not be loaded.
    #[error("cannot load connection settings: {0}")]
    Settings(String),

    /// The configured host is not a usable URL.
    #[error("invalid backend host '{0}'")]
    InvalidHost(String),

    /// The HTTP transport could not be built.
    #[error("cannot build http transport: {0}")]
    Transport(String),
}

/// A long-lived client scoped to one API surface.
#[derive(Debug)]
pub struct BackendClient {
    surface: ApiSurface,
    host: Url,
    credentials: Credentials,
    http: reqwest::Client,
}

impl BackendClient {
    /// Build a client for `surface` from resolved settings.
    pub fn new(
        surface: ApiSurface,
        settings: &ConnectionSettings,
    ) -> Result<Self, ClientBuildError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT);

        if let Some(pem) = &settings.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ClientBuildError::Transport(format!("invalid CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(identity) = &settings.client_identity {
            let identity = reqwest::Identity::from_pkcs8_pem(&identity.cert_pem, &identity.key_pem)
                .map_err(|e| {
                    ClientBuildError::Transport(format!("invalid client certificate: {}", e))
                })?;
            builder = builder.identity(identity);
        }

        if settings.insecure_skip_tls_verify {
            tracing::warn!(surface = %surface, "TLS verification of the backend is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| ClientBuildError::Transport(e.to_string()))?;

        Ok(Self {
            surface,
            host: settings.host.clone(),
            credentials: settings.credentials.clone(),
            http,
        })
    }

    /// The API surface this client is bound to.
    pub fn surface(&self) -> &ApiSurface {
        &self.surface
    }

    /// Base URL of the surface (host plus API path).
    pub fn base_url(&self) -> String {
        format!("{}{}", self.host_prefix(), self.surface.api_path())
    }

    /// Absolute URL for a request target (path and query).
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.host_prefix(), path_and_query)
    }

    /// Build an outbound request bound to this client.
    ///
    /// An empty body is not sent at all.
    pub fn build_request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Bytes,
        content_type: Option<&HeaderValue>,
    ) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, self.url_for(path_and_query));

        request = match &self.credentials {
            Credentials::None => request,
            Credentials::Bearer(token) => request.bearer_auth(token),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };

        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type.clone());
        }

        if !body.is_empty() {
            request = request.body(body);
        }

        request
    }

    fn host_prefix(&self) -> &str {
        self.host.as_str().trim_end_matches('/')
    }
}

/// Constructs backend clients for API surfaces.
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    /// Build a new client for `surface`.
    async fn build(&self, surface: &ApiSurface) -> Result<BackendClient, ClientBuildError>;
}

/// Factory that loads settings from a provider on every construction.
pub struct DefaultClientFactory {
    settings: Box<dyn SettingsProvider>,
}

impl DefaultClientFactory {
    pub fn new(settings: Box<dyn SettingsProvider>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ClientFactory for DefaultClientFactory {
    async fn build(&self, surface: &ApiSurface) -> Result<BackendClient, ClientBuildError> {
        let settings = self.settings.load()?;
        BackendClient::new(surface.clone(), &settings)
    }
}
