//! Body filter middleware.
//!
//! Requests matching a rule have their JSON body buffered, projected through
//! the rule's template and replaced before they reach the proxy handler.
//! Anything that cannot be projected is rejected with 400 and never proxied.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ProxyError;
use crate::filter::rules::BodyFilter;
use crate::filter::template;
use crate::observability::metrics;

/// Axum middleware applying `filter` to matching requests.
///
/// Install with `axum::middleware::from_fn_with_state`.
pub async fn body_filter(
    State(filter): State<Arc<BodyFilter>>,
    request: Request,
    next: Next,
) -> Response {
    match apply(&filter, request).await {
        Ok(request) => next.run(request).await,
        Err(e) => {
            metrics::record_filter_rejection(e.kind());
            e.into_response()
        }
    }
}

/// Rewrite the body of `request` if a rule matches it.
pub async fn apply(filter: &BodyFilter, request: Request) -> Result<Request, ProxyError> {
    let Some(rule) = filter.match_rule(request.method().as_str(), request.uri().path()) else {
        return Ok(request);
    };
    let mut projected = rule.template().clone();

    let (mut parts, body) = request.into_parts();

    // 1. Buffer
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(ProxyError::RequestBody)?;
    if bytes.is_empty() {
        return Err(ProxyError::EmptyBody);
    }

    // 2. Decode
    let source: Value = serde_json::from_slice(&bytes).map_err(ProxyError::BodyDecode)?;

    // 3. Project
    template::filter(&source, &mut projected)?;

    // 4. Replace
    let filtered = serde_json::to_vec(&projected).map_err(ProxyError::BodyDecode)?;
    tracing::debug!(
        path = %parts.uri.path(),
        original_len = bytes.len(),
        filtered_len = filtered.len(),
        "Request body filtered"
    );
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(filtered.len()));

    Ok(Request::from_parts(parts, Body::from(filtered)))
}
