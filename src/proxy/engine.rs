//! Request forwarding.
//!
//! # Responsibilities
//! - Resolve the API surface of an inbound request
//! - Replay the request against that surface's backend client
//! - Post-process the response body when a transformer is requested
//! - Record request metrics and log the outcome
//!
//! # Design Decisions
//! - The backend call runs inside the inbound handler future, so dropping
//!   the inbound request cancels it
//! - Backend status codes are passed through untouched, errors included
//! - Only `Content-Type` is replayed from the inbound headers; the client
//!   adds `Accept`, `User-Agent` and credentials

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

use crate::config::BackendConfig;
use crate::error::ProxyError;
use crate::http::RequestIdExt;
use crate::kube::{self, settings, ClientRegistry, DefaultClientFactory};
use crate::observability::metrics;
use crate::proxy::transform::TransformerSet;

const APPLICATION_JSON: &str = "application/json";

/// Forwards inbound requests to the API server.
pub struct ProxyEngine {
    registry: ClientRegistry,
    transformers: TransformerSet,
}

impl ProxyEngine {
    pub fn new(registry: ClientRegistry, transformers: TransformerSet) -> Self {
        Self {
            registry,
            transformers,
        }
    }

    /// Engine with the default client factory and the `jq` transformer.
    pub fn from_config(backend: &BackendConfig) -> Self {
        let factory = DefaultClientFactory::new(settings::provider_for(backend));
        Self::new(
            ClientRegistry::new(Arc::new(factory)),
            TransformerSet::with_defaults(),
        )
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Serve a request, turning failures into error responses.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let request_id = request.request_id().to_string();
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let group = kube::resolve(&path)
            .map(|surface| surface.group)
            .unwrap_or_else(|_| "none".to_string());

        tracing::debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            group = %group,
            "Proxying request"
        );

        let response = match self.serve(request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };

        let status = response.status().as_u16();
        metrics::record_request(&method, status, &group, start);
        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Request completed"
        );

        response
    }

    /// Forward a request and build the client response.
    pub async fn serve(&self, request: Request<Body>) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();

        // 1. Resolve Surface
        let surface = kube::resolve(parts.uri.path())?;

        // 2. Obtain Client
        let client = self.registry.get_or_create(&surface).await?;

        // 3. Build Outbound Request
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(ProxyError::RequestBody)?;
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());
        let outbound = client.build_request(
            parts.method.clone(),
            target,
            body,
            parts.headers.get(header::CONTENT_TYPE),
        );

        // 4. Execute
        let upstream = outbound.send().await.map_err(ProxyError::BackendRequest)?;
        let status = upstream.status();
        let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();

        // 5. Read Body
        let raw = upstream.bytes().await.map_err(ProxyError::ResponseRead)?;

        // 6. Transform
        let (body, content_type) = match self.transformers.select(parts.uri.query()) {
            Some((transformer, options)) => {
                let result = transformer.run(&raw, &options);
                metrics::record_transform(
                    transformer.name(),
                    if result.is_ok() { "ok" } else { "error" },
                );
                tracing::debug!(
                    transformer = transformer.name(),
                    src = %options.src,
                    "Transforming response body"
                );
                (
                    Bytes::from(result?),
                    Some(HeaderValue::from_static(APPLICATION_JSON)),
                )
            }
            None => (raw, content_type),
        };

        // 7. Write Response
        let mut builder = Response::builder().status(status);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder
            .body(Body::from(body))
            .map_err(ProxyError::ResponseWrite)
    }
}
