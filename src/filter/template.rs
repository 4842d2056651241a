//! Template-driven JSON projection.
//!
//! A template mirrors the shape of the request body. Every `"*"` leaf is
//! replaced with the body's value at that position; keys the template does
//! not mention are dropped. The template is rewritten in place and becomes
//! the projected body.
//!
//! # Rules
//! - Every template key must exist in the body
//! - Object and array template values require the same type in the body
//! - A template array may not be longer than the body array
//! - Scalar template values other than `"*"` are kept and never validated
//! - Scalar array elements, `"*"` included, are left untouched

use serde_json::{Map, Value};
use thiserror::Error;

const WILDCARD: &str = "*";
const ROOT_KEY: &str = "<root>";

/// Errors raised while projecting a body through a template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("key '{key}' not found in request body")]
    KeyNotFound { key: String },

    #[error("key '{key}' is not {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("key '{key}' template array has {template_len} element(s) but body array has {source_len}")]
    ArrayLengthMismatch {
        key: String,
        template_len: usize,
        source_len: usize,
    },
}

impl FilterError {
    /// Stable label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            FilterError::KeyNotFound { .. } => "key_not_found",
            FilterError::TypeMismatch { .. } => "type_mismatch",
            FilterError::ArrayLengthMismatch { .. } => "array_length_mismatch",
        }
    }
}

/// Project `source` through `template`, rewriting `template` in place.
pub fn filter(source: &Value, template: &mut Value) -> Result<(), FilterError> {
    if template.as_str() == Some(WILDCARD) {
        *template = source.clone();
        return Ok(());
    }

    match template {
        Value::Object(fields) => {
            let source = source.as_object().ok_or_else(|| FilterError::TypeMismatch {
                key: ROOT_KEY.to_string(),
                expected: "an object",
            })?;
            filter_object(source, fields)
        }
        Value::Array(items) => {
            let source = source.as_array().ok_or_else(|| FilterError::TypeMismatch {
                key: ROOT_KEY.to_string(),
                expected: "an array",
            })?;
            filter_array(source, items, ROOT_KEY)
        }
        _ => Ok(()),
    }
}

fn filter_object(source: &Map<String, Value>, template: &mut Map<String, Value>) -> Result<(), FilterError> {
    for (key, slot) in template.iter_mut() {
        let value = source
            .get(key)
            .ok_or_else(|| FilterError::KeyNotFound { key: key.clone() })?;

        if slot.as_str() == Some(WILDCARD) {
            *slot = value.clone();
            continue;
        }

        match slot {
            Value::Object(fields) => {
                let value = value.as_object().ok_or_else(|| FilterError::TypeMismatch {
                    key: key.clone(),
                    expected: "an object",
                })?;
                filter_object(value, fields)?;
            }
            Value::Array(items) => {
                let value = value.as_array().ok_or_else(|| FilterError::TypeMismatch {
                    key: key.clone(),
                    expected: "an array",
                })?;
                filter_array(value, items, key)?;
            }
            _ => tracing::trace!(key = %key, "Scalar template value kept as-is"),
        }
    }

    Ok(())
}

/// Element-wise projection. `key` names the enclosing object key.
fn filter_array(source: &[Value], template: &mut [Value], key: &str) -> Result<(), FilterError> {
    if template.len() > source.len() {
        return Err(FilterError::ArrayLengthMismatch {
            key: key.to_string(),
            template_len: template.len(),
            source_len: source.len(),
        });
    }

    for (slot, value) in template.iter_mut().zip(source) {
        match slot {
            Value::Object(fields) => {
                let value = value.as_object().ok_or_else(|| FilterError::TypeMismatch {
                    key: key.to_string(),
                    expected: "an array of objects",
                })?;
                filter_object(value, fields)?;
            }
            Value::Array(items) => {
                let value = value.as_array().ok_or_else(|| FilterError::TypeMismatch {
                    key: key.to_string(),
                    expected: "an array of arrays",
                })?;
                filter_array(value, items, key)?;
            }
            _ => {}
        }
    }

    Ok(())
}
