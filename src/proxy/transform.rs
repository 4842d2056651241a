//! Response body post-processing.
//!
//! # Responsibilities
//! - Hold the ordered set of available transformers
//! - Select a transformer from the request query string
//! - Run the `jq` projection over JSON response bodies
//!
//! # Selection
//! Transformers are checked in registration order. The first one whose name
//! appears as a query parameter with a non-empty value is applied with that
//! value as its source; no other transformer runs.

use jaq_interpret::{Ctx, FilterT, ParseCtx, RcIter, Val};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while transforming a response body.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("response body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("cannot parse query '{query}' ({errors} error(s))")]
    Parse { query: String, errors: usize },

    #[error("cannot compile query '{query}' ({errors} error(s))")]
    Compile { query: String, errors: usize },

    #[error("query evaluation failed: {0}")]
    Eval(String),

    #[error("cannot encode query output: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Options handed to a transformer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    /// Transformer program taken from the query parameter value.
    pub src: String,
}

/// A named response body transformer.
pub trait ResponseTransformer: Send + Sync {
    /// Query parameter name that selects this transformer.
    fn name(&self) -> &str;

    /// Transform a raw response body.
    fn run(&self, body: &[u8], options: &TransformOptions) -> Result<Vec<u8>, TransformError>;
}

/// `jq` query-language projection.
///
/// Zero results produce an empty body, a single result is written as-is,
/// several results are wrapped in a JSON array.
#[derive(Debug, Default, Clone, Copy)]
pub struct JqTransformer;

impl JqTransformer {
    pub const NAME: &'static str = "jq";

    pub fn new() -> Self {
        Self
    }

    fn evaluate(query: &str, input: Value) -> Result<Vec<Value>, TransformError> {
        let mut defs = ParseCtx::new(Vec::new());
        defs.insert_natives(jaq_core::core());
        defs.insert_defs(jaq_std::std());

        let (parsed, errs) = jaq_parse::parse(query, jaq_parse::main());
        let parsed = match parsed {
            Some(parsed) if errs.is_empty() => parsed,
            _ => {
                return Err(TransformError::Parse {
                    query: query.to_string(),
                    errors: errs.len().max(1),
                })
            }
        };

        let filter = defs.compile(parsed);
        if !defs.errs.is_empty() {
            return Err(TransformError::Compile {
                query: query.to_string(),
                errors: defs.errs.len(),
            });
        }

        let inputs = RcIter::new(core::iter::empty());
        let mut outputs = Vec::new();
        for item in filter.run((Ctx::new([], &inputs), Val::from(input))) {
            let value = item.map_err(|e| TransformError::Eval(e.to_string()))?;
            outputs.push(Value::from(value));
        }

        Ok(outputs)
    }
}

impl ResponseTransformer for JqTransformer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, body: &[u8], options: &TransformOptions) -> Result<Vec<u8>, TransformError> {
        let input: Value = serde_json::from_slice(body).map_err(TransformError::InvalidJson)?;

        let mut outputs = Self::evaluate(&options.src, input)?;

        let encoded = match outputs.len() {
            0 => return Ok(Vec::new()),
            1 => serde_json::to_vec(&outputs.remove(0)),
            _ => serde_json::to_vec(&Value::Array(outputs)),
        };

        encoded.map_err(TransformError::Encode)
    }
}

/// Ordered, read-only set of transformers.
#[derive(Clone, Default)]
pub struct TransformerSet {
    transformers: Vec<Arc<dyn ResponseTransformer>>,
}

impl TransformerSet {
    pub fn new(transformers: Vec<Arc<dyn ResponseTransformer>>) -> Self {
        Self { transformers }
    }

    /// Set holding only the `jq` transformer.
    pub fn with_defaults() -> Self {
        Self::new(vec![Arc::new(JqTransformer::new())])
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Pick the transformer requested by `query` (the raw query string).
    pub fn select(
        &self,
        query: Option<&str>,
    ) -> Option<(&Arc<dyn ResponseTransformer>, TransformOptions)> {
        let query = query?;

        self.transformers.iter().find_map(|transformer| {
            let src = url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == transformer.name())
                .map(|(_, value)| value.into_owned())?;

            if src.is_empty() {
                None
            } else {
                Some((transformer, TransformOptions { src }))
            }
        })
    }
}

impl std::fmt::Debug for TransformerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.transformers.iter().map(|t| t.name()))
            .finish()
    }
}
