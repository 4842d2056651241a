//! Global connection settings for the API server.
//!
//! # Responsibilities
//! - Produce host, credentials and trust settings for client construction
//! - Explicit settings from the config file
//! - Kubeconfig settings, falling back to the in-cluster service account
//!
//! # Design Decisions
//! - Settings are loaded on every client construction, not at startup, so a
//!   rotated token file is picked up by the next new surface
//! - Loading failures surface as `ClientBuildError::Settings`

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::BackendConfig;
use crate::kube::client::ClientBuildError;
use crate::kube::kubeconfig::KubeconfigSettings;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Credentials attached to every backend request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

/// Resolved connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// API server base URL.
    pub host: Url,
    /// Authentication for every request.
    pub credentials: Credentials,
    /// Extra PEM root certificate.
    pub ca_pem: Option<Vec<u8>>,
    /// Client certificate presented to the API server.
    pub client_identity: Option<ClientIdentity>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
}

/// PEM client certificate and PKCS#8 key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// Source of connection settings.
pub trait SettingsProvider: Send + Sync {
    /// Load the current settings.
    fn load(&self) -> Result<ConnectionSettings, ClientBuildError>;
}

/// Select the provider for a backend configuration.
///
/// An explicit host wins. Otherwise a configured kubeconfig is tried first
/// and the in-cluster service account second.
pub fn provider_for(config: &BackendConfig) -> Box<dyn SettingsProvider> {
    if config.host.is_some() {
        return Box::new(StaticSettings::new(config.clone()));
    }

    match &config.kubeconfig {
        Some(path) => Box::new(FallbackSettings::new(
            Box::new(KubeconfigSettings::new(path)),
            Box::new(InClusterSettings::default()),
        )),
        None => Box::new(InClusterSettings::default()),
    }
}

/// Tries `primary`, then `fallback`.
pub struct FallbackSettings {
    primary: Box<dyn SettingsProvider>,
    fallback: Box<dyn SettingsProvider>,
}

impl FallbackSettings {
    pub fn new(primary: Box<dyn SettingsProvider>, fallback: Box<dyn SettingsProvider>) -> Self {
        Self { primary, fallback }
    }
}

impl SettingsProvider for FallbackSettings {
    fn load(&self) -> Result<ConnectionSettings, ClientBuildError> {
        let primary = match self.primary.load() {
            Ok(settings) => return Ok(settings),
            Err(e) => e,
        };
        tracing::debug!(error = %primary, "Primary connection settings unusable, trying fallback");

        self.fallback.load().map_err(|fallback| {
            ClientBuildError::Settings(format!("{}; {}", detail(&primary), detail(&fallback)))
        })
    }
}

fn detail(error: &ClientBuildError) -> String {
    match error {
        ClientBuildError::Settings(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Settings taken from the `[backend]` config section.
#[derive(Debug, Clone)]
pub struct StaticSettings {
    config: BackendConfig,
}

impl StaticSettings {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

impl SettingsProvider for StaticSettings {
    fn load(&self) -> Result<ConnectionSettings, ClientBuildError> {
        let host = self
            .config
            .host
            .as_deref()
            .ok_or_else(|| ClientBuildError::Settings("backend host is not configured".into()))?;
        let host = Url::parse(host).map_err(|_| ClientBuildError::InvalidHost(host.to_string()))?;

        let credentials = if let Some(token) = &self.config.token {
            Credentials::Bearer(token.clone())
        } else if let Some(path) = &self.config.token_file {
            Credentials::Bearer(read_trimmed(Path::new(path))?)
        } else if let (Some(username), Some(password)) =
            (&self.config.username, &self.config.password)
        {
            Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            }
        } else {
            Credentials::None
        };

        let ca_pem = match &self.config.ca_file {
            Some(path) => Some(read_file(Path::new(path))?),
            None => None,
        };

        Ok(ConnectionSettings {
            host,
            credentials,
            ca_pem,
            client_identity: None,
            insecure_skip_tls_verify: self.config.insecure_skip_tls_verify,
        })
    }
}

/// Settings of a pod running inside the cluster.
#[derive(Debug, Clone)]
pub struct InClusterSettings {
    account_dir: PathBuf,
}

impl Default for InClusterSettings {
    fn default() -> Self {
        Self {
            account_dir: PathBuf::from(SERVICE_ACCOUNT_DIR),
        }
    }
}

impl InClusterSettings {
    /// Use a custom service account directory.
    pub fn with_account_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            account_dir: dir.into(),
        }
    }
}

impl SettingsProvider for InClusterSettings {
    fn load(&self) -> Result<ConnectionSettings, ClientBuildError> {
        let (host, port) = match (
            env::var("KUBERNETES_SERVICE_HOST"),
            env::var("KUBERNETES_SERVICE_PORT"),
        ) {
            (Ok(host), Ok(port)) if !host.is_empty() && !port.is_empty() => (host, port),
            _ => {
                return Err(ClientBuildError::Settings(
                    "no backend host configured and not running in a cluster \
                     (KUBERNETES_SERVICE_HOST/PORT unset)"
                        .into(),
                ))
            }
        };

        // IPv6 service hosts need brackets in the authority.
        let authority = if host.contains(':') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };
        let raw = format!("https://{}", authority);
        let host = Url::parse(&raw).map_err(|_| ClientBuildError::InvalidHost(raw))?;

        let token = read_trimmed(&self.account_dir.join("token"))?;
        let ca_pem = read_file(&self.account_dir.join("ca.crt"))?;

        Ok(ConnectionSettings {
            host,
            credentials: Credentials::Bearer(token),
            ca_pem: Some(ca_pem),
            client_identity: None,
            insecure_skip_tls_verify: false,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ClientBuildError> {
    fs::read(path).map_err(|e| {
        ClientBuildError::Settings(format!("cannot read {}: {}", path.display(), e))
    })
}

fn read_trimmed(path: &Path) -> Result<String, ClientBuildError> {
    let bytes = read_file(path)?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(host: &str) -> BackendConfig {
        BackendConfig {
            host: Some(host.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_static_bearer_token() {
        let mut config = backend("https://10.0.0.1:6443");
        config.token = Some("secret".into());

        let settings = StaticSettings::new(config).load().unwrap();
        assert_eq!(settings.host.as_str(), "https://10.0.0.1:6443/");
        assert_eq!(settings.credentials, Credentials::Bearer("secret".into()));
        assert!(settings.ca_pem.is_none());
    }

    #[test]
    fn test_static_basic_auth() {
        let mut config = backend("http://127.0.0.1:8001");
        config.username = Some("user".into());
        config.password = Some("pass".into());

        let settings = StaticSettings::new(config).load().unwrap();
        assert_eq!(
            settings.credentials,
            Credentials::Basic {
                username: "user".into(),
                password: "pass".into()
            }
        );
    }

    #[test]
    fn test_static_token_file_is_trimmed() {
        let path = std::env::temp_dir().join("apiserver_gateway_token_test");
        fs::write(&path, "file-token\n").unwrap();

        let mut config = backend("http://127.0.0.1:8001");
        config.token_file = Some(path.display().to_string());

        let settings = StaticSettings::new(config).load().unwrap();
        assert_eq!(settings.credentials, Credentials::Bearer("file-token".into()));

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_static_missing_ca_file() {
        let mut config = backend("https://10.0.0.1:6443");
        config.ca_file = Some("/nonexistent/ca.crt".into());

        let err = StaticSettings::new(config).load().unwrap_err();
        assert!(matches!(err, ClientBuildError::Settings(_)));
    }

    #[test]
    fn test_static_invalid_host() {
        let err = StaticSettings::new(backend("not a url")).load().unwrap_err();
        assert_eq!(err, ClientBuildError::InvalidHost("not a url".into()));
    }

    #[test]
    fn test_provider_selection() {
        // An explicit host never touches the service account directory.
        let provider = provider_for(&backend("http://127.0.0.1:8001"));
        assert!(provider.load().is_ok());
    }

    #[test]
    fn test_fallback_after_unusable_kubeconfig() {
        let provider = FallbackSettings::new(
            Box::new(KubeconfigSettings::new("/nonexistent/kubeconfig")),
            Box::new(StaticSettings::new(backend("http://127.0.0.1:8001"))),
        );

        let settings = provider.load().unwrap();
        assert_eq!(settings.host.as_str(), "http://127.0.0.1:8001/");
    }

    #[test]
    fn test_fallback_reports_both_failures() {
        let provider = FallbackSettings::new(
            Box::new(KubeconfigSettings::new("/nonexistent/kubeconfig")),
            Box::new(StaticSettings::new(BackendConfig::default())),
        );

        match provider.load().unwrap_err() {
            ClientBuildError::Settings(message) => {
                assert!(message.starts_with("kubeconfig: cannot read"));
                assert!(message.ends_with("; backend host is not configured"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_kubeconfig_preferred_over_in_cluster() {
        let dir = std::env::temp_dir().join("apiserver_gateway_provider_kubeconfig");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config");
        fs::write(
            &path,
            r#"
current-context: c
clusters:
- name: c
  cluster:
    server: https://kube.example:6443
contexts:
- name: c
  context:
    cluster: c
"#,
        )
        .unwrap();

        let config = BackendConfig {
            kubeconfig: Some(path.display().to_string()),
            ..Default::default()
        };
        let settings = provider_for(&config).load().unwrap();
        assert_eq!(settings.host.as_str(), "https://kube.example:6443/");
        assert_eq!(settings.credentials, Credentials::None);

        fs::remove_dir_all(&dir).unwrap_or_default();
    }
}
