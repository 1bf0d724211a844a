//! Unified error handling for the edge gateway

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure classes for calls to an upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    Timeout,
    ConnectionFailed,
    ProtocolError,
    PoolExhausted,
}

impl RemoteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::ConnectionFailed => "connection_failed",
            RemoteErrorKind::ProtocolError => "protocol_error",
            RemoteErrorKind::PoolExhausted => "pool_exhausted",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized upstream failure.
///
/// Every transport-specific error (HTTP client, gRPC status, timeouts,
/// connection slot waits) is folded into this one value so callers never
/// depend on which protocol produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("upstream '{upstream}' failed ({kind}): {cause}")]
pub struct RemoteError {
    pub upstream: String,
    pub kind: RemoteErrorKind,
    pub cause: String,
}

impl RemoteError {
    pub fn new(upstream: impl Into<String>, kind: RemoteErrorKind, cause: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            kind,
            cause: cause.into(),
        }
    }

    pub fn timeout(upstream: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(upstream, RemoteErrorKind::Timeout, cause)
    }

    pub fn connection_failed(upstream: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(upstream, RemoteErrorKind::ConnectionFailed, cause)
    }

    pub fn protocol(upstream: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::new(upstream, RemoteErrorKind::ProtocolError, cause)
    }

    pub fn pool_exhausted(upstream: impl Into<String>) -> Self {
        Self::new(
            upstream,
            RemoteErrorKind::PoolExhausted,
            "no free connection slot",
        )
    }

    /// Record this failure in the upstream error counter.
    pub fn record(&self) {
        metrics::counter!(
            "edge_upstream_errors_total",
            "upstream" => self.upstream.clone(),
            "kind" => self.kind.as_str()
        )
        .increment(1);
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("No route matches the request")]
    RouteNotFound,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Aggregation failed for customers {failed_keys:?}")]
    AggregationPartialFailure { failed_keys: Vec<i32> },

    #[error("Aggregation did not complete within its deadline")]
    AggregationTimeout,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let mut details = None;
        let (status, error_type) = match &self {
            AppError::AuthRequired => (StatusCode::UNAUTHORIZED, "auth_required"),
            AppError::RateLimited { retry_after } => {
                details = Some(serde_json::json!({ "retryAfter": retry_after }));
                (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
            }
            AppError::RouteNotFound => (StatusCode::NOT_FOUND, "route_not_found"),
            AppError::Remote(e) => {
                tracing::error!(upstream = %e.upstream, kind = %e.kind, cause = %e.cause, "Upstream call failed");
                details = Some(serde_json::json!({ "upstream": e.upstream, "kind": e.kind }));
                let status = match e.kind {
                    RemoteErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    RemoteErrorKind::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
                    RemoteErrorKind::ConnectionFailed | RemoteErrorKind::ProtocolError => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, "remote_error")
            }
            AppError::AggregationPartialFailure { failed_keys } => {
                details = Some(serde_json::json!({ "failedKeys": failed_keys }));
                (StatusCode::BAD_GATEWAY, "aggregation_partial_failure")
            }
            AppError::AggregationTimeout => (StatusCode::GATEWAY_TIMEOUT, "aggregation_timeout"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "internal_error".to_string(),
                        message: "An internal error occurred".to_string(),
                        details: None,
                    }),
                )
                    .into_response();
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        });

        let mut response = (status, body).into_response();
        match &self {
            AppError::AuthRequired => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"edge\""),
                );
            }
            AppError::RateLimited { retry_after } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            }
            _ => {}
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::RateLimited { retry_after: 2 };
        assert_eq!(err.to_string(), "Rate limit exceeded, retry after 2s");
    }

    #[test]
    fn test_error_conversion() {
        let err: AppError = anyhow::anyhow!("Something went wrong").into();
        assert!(matches!(err, AppError::Internal(_)));

        let err: AppError = RemoteError::timeout("customers", "deadline elapsed").into();
        assert!(matches!(err, AppError::Remote(_)));
    }

    #[test]
    fn test_auth_required_response() {
        let response = AppError::AuthRequired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"edge\""
        );
    }

    #[test]
    fn test_rate_limited_response_has_retry_after() {
        let response = AppError::RateLimited { retry_after: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "3");
    }

    #[test]
    fn test_remote_error_status_mapping() {
        let cases = [
            (RemoteError::timeout("orders", "slow"), StatusCode::GATEWAY_TIMEOUT),
            (RemoteError::pool_exhausted("orders"), StatusCode::SERVICE_UNAVAILABLE),
            (RemoteError::connection_failed("orders", "refused"), StatusCode::BAD_GATEWAY),
            (RemoteError::protocol("orders", "bad frame"), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::connection_failed("customers", "connection refused");
        assert_eq!(
            err.to_string(),
            "upstream 'customers' failed (connection_failed): connection refused"
        );
    }
}
