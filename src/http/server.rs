//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, CORS, timeout, body filter)
//! - Bind the server to a listener and shut down gracefully
//!
//! # Layer Order (outermost first)
//! ```text
//! set x-request-id → trace span → propagate x-request-id → timeout
//!     → CORS → body filter → proxy handler
//! ```

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ConfigError, GatewayConfig};
use crate::filter::{body_filter, BodyFilter};
use crate::http::middleware::{cors_middleware, CorsPolicy};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::lifecycle::{shutdown::recv_shutdown, signals};
use crate::proxy::ProxyEngine;

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a server with the default proxy engine for `config.backend`.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let engine = Arc::new(ProxyEngine::from_config(&config.backend));
        Self::with_engine(config, engine)
    }

    /// Create a server around an existing engine.
    ///
    /// Fails if a body filter rule does not compile.
    pub fn with_engine(config: GatewayConfig, engine: Arc<ProxyEngine>) -> Result<Self, ConfigError> {
        let filter = if config.body_filter.enabled {
            let filter = BodyFilter::from_config(&config.body_filter)?;
            tracing::info!(rules = filter.len(), "Body filter enabled");
            Some(Arc::new(filter))
        } else {
            None
        };

        let cors = config
            .cors
            .enabled
            .then(|| Arc::new(CorsPolicy::from_config(&config.cors)));

        let router = Self::build_router(&config, engine, filter, cors);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        engine: Arc<ProxyEngine>,
        filter: Option<Arc<BodyFilter>>,
        cors: Option<Arc<CorsPolicy>>,
    ) -> Router {
        let mut router = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(engine);

        if let Some(filter) = filter {
            router = router.layer(axum::middleware::from_fn_with_state(filter, body_filter));
        }

        if let Some(cors) = cors {
            router = router.layer(axum::middleware::from_fn_with_state(cors, cors_middleware));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(propagate_request_id_layer())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        request_id = %request.request_id(),
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }),
            )
            .layer(set_request_id_layer())
    }

    /// Run the server until a termination signal or `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = signals::wait_for_termination() => {}
                    _ = recv_shutdown(shutdown) => tracing::info!("Shutdown requested"),
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Catch-all handler forwarding every request to the engine.
async fn proxy_handler(State(engine): State<Arc<ProxyEngine>>, request: Request<Body>) -> Response {
    engine.handle(request).await
}
