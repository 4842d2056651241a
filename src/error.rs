//! Request-level error type.
//!
//! Every stage of a proxied request fails with a `ProxyError`. Stage
//! failures on the backend side map to 500, rejected request bodies map to
//! 400. The response body is the plain-text error message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::filter::FilterError;
use crate::kube::{ClientBuildError, UriError};
use crate::proxy::TransformError;

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("cannot resolve request uri: {0}")]
    Uri(#[from] UriError),

    #[error("cannot create backend client: {0}")]
    ClientConstruction(#[from] ClientBuildError),

    #[error("backend request failed: {0}")]
    BackendRequest(#[source] reqwest::Error),

    #[error("cannot read backend response body: {0}")]
    ResponseRead(#[source] reqwest::Error),

    #[error("cannot transform response body: {0}")]
    Transformation(#[from] TransformError),

    #[error("cannot write response: {0}")]
    ResponseWrite(#[source] axum::http::Error),

    #[error("cannot read request body: {0}")]
    RequestBody(#[source] axum::Error),

    #[error("Empty request body")]
    EmptyBody,

    #[error("cannot decode request body: {0}")]
    BodyDecode(#[source] serde_json::Error),

    #[error("request body rejected by filter: {0}")]
    Filter(#[from] FilterError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::EmptyBody
            | ProxyError::RequestBody(_)
            | ProxyError::BodyDecode(_)
            | ProxyError::Filter(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Uri(UriError::NotSupported(_)) => "uri_not_supported",
            ProxyError::Uri(UriError::Malformed(_)) => "malformed_uri",
            ProxyError::ClientConstruction(_) => "client_construction_failed",
            ProxyError::BackendRequest(_) => "backend_request_failed",
            ProxyError::ResponseRead(_) => "response_read_failed",
            ProxyError::Transformation(_) => "transformation_failed",
            ProxyError::ResponseWrite(_) => "response_write_failed",
            ProxyError::RequestBody(_) => "request_body_unreadable",
            ProxyError::EmptyBody => "empty_body",
            ProxyError::BodyDecode(_) => "body_decode_failed",
            ProxyError::Filter(FilterError::KeyNotFound { .. }) => "filter_key_not_found",
            ProxyError::Filter(FilterError::TypeMismatch { .. }) => "filter_type_mismatch",
            ProxyError::Filter(FilterError::ArrayLengthMismatch { .. }) => {
                "filter_array_length_mismatch"
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::warn!(kind = self.kind(), status = status.as_u16(), error = %self, "Request rejected");
        }

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ProxyError, StatusCode)> = vec![
            (UriError::NotSupported("/x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (UriError::Malformed("/apis/x".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ClientBuildError::Settings("no token".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ProxyError::EmptyBody, StatusCode::BAD_REQUEST),
            (
                FilterError::KeyNotFound { key: "a".into() }.into(),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err);
        }
    }

    #[test]
    fn test_kind_labels() {
        let err: ProxyError = UriError::Malformed("/apis/apps".into()).into();
        assert_eq!(err.kind(), "malformed_uri");

        let err: ProxyError = FilterError::ArrayLengthMismatch {
            key: "tests".into(),
            template_len: 2,
            source_len: 1,
        }
        .into();
        assert_eq!(err.kind(), "filter_array_length_mismatch");
    }

    #[test]
    fn test_display_keeps_stage_context() {
        let err: ProxyError = UriError::NotSupported("/healthz".into()).into();
        assert_eq!(
            err.to_string(),
            "cannot resolve request uri: uri is not supported: '/healthz'"
        );
    }

    #[tokio::test]
    async fn test_into_response() {
        let response = ProxyError::EmptyBody.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Empty request body");
    }
}
