//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use apiserver_gateway::{GatewayConfig, HttpServer, Shutdown};

/// A request seen by the mock API server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path_and_query: String,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

/// Mock API server answering every request with a fixed JSON body.
pub struct MockApiServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockApiServer {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = (Arc::clone(&requests), status, body);

        async fn record(
            State((requests, status, body)): State<(Arc<Mutex<Vec<Recorded>>>, u16, &'static str)>,
            request: Request,
        ) -> Response {
            let headers = request.headers().clone();
            let get_header = |name: header::HeaderName| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let mut recorded = Recorded {
                method: request.method().to_string(),
                path_and_query: request
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.to_string())
                    .unwrap_or_default(),
                content_type: get_header(header::CONTENT_TYPE),
                authorization: get_header(header::AUTHORIZATION),
                body: String::new(),
            };

            let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
                .await
                .unwrap_or_default();
            recorded.body = String::from_utf8_lossy(&bytes).into_owned();
            requests.lock().unwrap().push(recorded);

            (
                StatusCode::from_u16(status).unwrap(),
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/", any(record))
            .route("/{*path}", any(record))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = HttpServer::new(config).unwrap();
        let shutdown = Shutdown::new();
        tokio::spawn(server.run(listener, shutdown.subscribe()));

        Self { addr, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

/// Gateway configuration pointing at `backend`.
pub fn config_for(backend: &MockApiServer) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.backend.host = Some(backend.url());
    config.backend.token = Some("integration-token".to_string());
    config
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
