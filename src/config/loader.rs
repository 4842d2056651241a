//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
    /// A rule that passed validation still failed to compile.
    Rule(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::Rule(msg) => write!(f, "Invalid filter rule: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Load configuration if the file exists, otherwise fall back to defaults.
pub fn load_config_or_default(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    match path {
        Some(path) if path.exists() => load_config(path),
        Some(path) => {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(GatewayConfig::default())
        }
        None => Ok(GatewayConfig::default()),
    }
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply a command-line bind address and re-validate the result.
pub fn override_bind_address(
    mut config: GatewayConfig,
    bind_address: String,
) -> Result<GatewayConfig, ConfigError> {
    config.listener.bind_address = bind_address;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [backend]
            host = "https://10.0.0.1:6443"
            token = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.backend.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[listener").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error_display() {
        let err = parse_config("[timeouts]\nrequest_secs = 0").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: timeouts.request_secs: must be greater than zero"
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config =
            load_config_or_default(Some(Path::new("does-not-exist-gateway.toml"))).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join("apiserver_gateway_loader_test.toml");
        fs::write(&path, "[observability]\nlog_format = \"json\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.observability.log_format,
            crate::config::schema::LogFormat::Json
        );

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_bind_override_is_validated() {
        let config = override_bind_address(GatewayConfig::default(), "127.0.0.1:9100".into())
            .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9100");

        let err = override_bind_address(GatewayConfig::default(), "localhost".into()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: listener.bind_address: 'localhost' is not a socket address"
        );
    }
}
