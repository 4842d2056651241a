//! Kubeconfig file support.
//!
//! Reads the current context of a kubeconfig file and turns its cluster and
//! user entries into [`ConnectionSettings`]:
//! - server URL, CA data or file, `insecure-skip-tls-verify`
//! - bearer token or token file, basic auth
//! - client certificate and key, data or file
//!
//! Relative file references are resolved against the kubeconfig's directory.
//! Exec and auth-provider plugins are not supported; a user relying on them
//! gets no credentials.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::kube::client::ClientBuildError;
use crate::kube::settings::{ClientIdentity, ConnectionSettings, Credentials, SettingsProvider};

/// Errors raised while reading a kubeconfig.
#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse kubeconfig: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("no current context set")]
    NoCurrentContext,

    #[error("context '{0}' not found")]
    ContextNotFound(String),

    #[error("cluster '{0}' not found")]
    ClusterNotFound(String),

    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("invalid base64 in {field}: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("invalid server URL '{0}'")]
    InvalidServer(String),
}

/// The subset of a kubeconfig file the gateway understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    pub current_context: Option<String>,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub server: String,
    pub certificate_authority_data: Option<String>,
    pub certificate_authority: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: UserEntry,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    pub token: Option<String>,
    pub token_file: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_certificate_data: Option<String>,
    pub client_certificate: Option<String>,
    pub client_key_data: Option<String>,
    pub client_key: Option<String>,
}

impl Kubeconfig {
    pub fn from_file(path: &Path) -> Result<Self, KubeconfigError> {
        let content = fs::read_to_string(path).map_err(|source| KubeconfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, KubeconfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Connection settings of the current context.
    ///
    /// `base_dir` anchors relative certificate and token paths.
    pub fn resolve_current(&self, base_dir: &Path) -> Result<ConnectionSettings, KubeconfigError> {
        let name = self
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(KubeconfigError::NoCurrentContext)?;

        let context = self
            .contexts
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.context)
            .ok_or_else(|| KubeconfigError::ContextNotFound(name.to_string()))?;

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| KubeconfigError::ClusterNotFound(context.cluster.clone()))?;

        let user = if context.user.is_empty() {
            UserEntry::default()
        } else {
            self.users
                .iter()
                .find(|u| u.name == context.user)
                .map(|u| u.user.clone())
                .ok_or_else(|| KubeconfigError::UserNotFound(context.user.clone()))?
        };

        tracing::debug!(
            context = name,
            cluster = %context.cluster,
            server = %cluster.server,
            "Resolved kubeconfig context"
        );

        let host = Url::parse(&cluster.server)
            .map_err(|_| KubeconfigError::InvalidServer(cluster.server.clone()))?;

        let ca_pem = pem_from(
            "certificate-authority-data",
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base_dir,
        )?;

        let credentials = if let Some(token) = user.token.as_ref().filter(|t| !t.is_empty()) {
            Credentials::Bearer(token.clone())
        } else if let Some(path) = &user.token_file {
            let bytes = read(&resolve_path(base_dir, path))?;
            Credentials::Bearer(String::from_utf8_lossy(&bytes).trim().to_string())
        } else if let (Some(username), Some(password)) = (&user.username, &user.password) {
            Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            }
        } else {
            Credentials::None
        };

        let cert = pem_from(
            "client-certificate-data",
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            base_dir,
        )?;
        let key = pem_from(
            "client-key-data",
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            base_dir,
        )?;
        let client_identity = match (cert, key) {
            (Some(cert_pem), Some(key_pem)) => Some(ClientIdentity { cert_pem, key_pem }),
            _ => None,
        };

        Ok(ConnectionSettings {
            host,
            credentials,
            ca_pem,
            client_identity,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }
}

/// `~/.kube/config`, when a home directory is known.
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".kube").join("config"))
}

/// Settings read from a kubeconfig file on every load.
#[derive(Debug, Clone)]
pub struct KubeconfigSettings {
    path: PathBuf,
}

impl KubeconfigSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for KubeconfigSettings {
    fn load(&self) -> Result<ConnectionSettings, ClientBuildError> {
        let base_dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        Kubeconfig::from_file(&self.path)
            .and_then(|config| config.resolve_current(base_dir))
            .map_err(|e| ClientBuildError::Settings(format!("kubeconfig: {}", e)))
    }
}

/// Inline base64 data wins over a file reference.
fn pem_from(
    field: &'static str,
    data: Option<&str>,
    file: Option<&str>,
    base_dir: &Path,
) -> Result<Option<Vec<u8>>, KubeconfigError> {
    if let Some(data) = data.filter(|d| !d.is_empty()) {
        return BASE64
            .decode(data.trim())
            .map(Some)
            .map_err(|source| KubeconfigError::Decode { field, source });
    }

    match file.filter(|f| !f.is_empty()) {
        Some(path) => read(&resolve_path(base_dir, path)).map(Some),
        None => Ok(None),
    }
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, KubeconfigError> {
    fs::read(path).map_err(|source| KubeconfigError::Read {
        path: path.display().to_string(),
        source,
    })
}
