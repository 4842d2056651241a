//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check filter rules before the body filter compiles them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::{BackendConfig, CorsConfig, FilterRuleConfig, GatewayConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be greater than zero",
        ));
    }

    validate_backend(&config.backend, &mut errors);
    validate_cors(&config.cors, &mut errors);

    if config.body_filter.enabled && config.body_filter.rules.is_empty() {
        errors.push(ValidationError::new(
            "body_filter.rules",
            "at least one rule is required when the body filter is enabled",
        ));
    }

    for (i, rule) in config.body_filter.rules.iter().enumerate() {
        validate_rule(&format!("body_filter.rules[{}]", i), rule, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_backend(backend: &BackendConfig, errors: &mut Vec<ValidationError>) {
    if let Some(host) = &backend.host {
        match Url::parse(host) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => errors.push(ValidationError::new(
                "backend.host",
                format!("'{}' is not an absolute http(s) URL", host),
            )),
        }
    }

    if backend.token.is_some() && backend.token_file.is_some() {
        errors.push(ValidationError::new(
            "backend.token",
            "token and token_file are mutually exclusive",
        ));
    }

    if backend.username.is_some() != backend.password.is_some() {
        errors.push(ValidationError::new(
            "backend.username",
            "basic auth requires both username and password",
        ));
    }
}

fn validate_cors(cors: &CorsConfig, errors: &mut Vec<ValidationError>) {
    for origin in cors.allow_origins.iter().flatten() {
        if origin != "*" && Url::parse(origin).is_err() {
            errors.push(ValidationError::new(
                "cors.allow_origins",
                format!("'{}' is not a valid origin", origin),
            ));
        }
    }
}

fn validate_rule(field: &str, rule: &FilterRuleConfig, errors: &mut Vec<ValidationError>) {
    if rule.methods.is_empty() {
        errors.push(ValidationError::new(
            format!("{}.methods", field),
            "at least one method is required",
        ));
    }

    for method in &rule.methods {
        if method.is_empty() || method.to_uppercase() != *method {
            errors.push(ValidationError::new(
                format!("{}.methods", field),
                format!("'{}' must be a non-empty uppercase verb", method),
            ));
        }
    }

    if rule.paths.is_empty() {
        errors.push(ValidationError::new(
            format!("{}.paths", field),
            "at least one path is required",
        ));
    }

    for path in &rule.paths {
        if path.path.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.paths", field),
                "path must not be empty",
            ));
        }
        if path.kind != "glob" {
            errors.push(ValidationError::new(
                format!("{}.paths", field),
                format!("unsupported path type '{}', expected 'glob'", path.kind),
            ));
        } else if let Err(e) = glob::Pattern::new(&path.path) {
            errors.push(ValidationError::new(
                format!("{}.paths", field),
                format!("invalid glob '{}': {}", path.path, e),
            ));
        }
    }

    if rule.filter.trim().is_empty() {
        errors.push(ValidationError::new(
            format!("{}.filter", field),
            "filter is required",
        ));
    } else if let Err(e) = serde_json::from_str::<serde_json::Value>(&rule.filter) {
        errors.push(ValidationError::new(
            format!("{}.filter", field),
            format!("filter is not valid JSON: {}", e),
        ));
    }
}
