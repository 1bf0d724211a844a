//! Fallback handler that forwards matched requests to their route's upstream.

use super::RouteRequest;
use crate::error::{AppError, Result};
use crate::middleware::auth::principal_of;
use crate::state::AppState;
use crate::upstream::classify_reqwest_error;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};

/// Requests with larger bodies are rejected before forwarding.
pub const MAX_FORWARD_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn request_host(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
}

fn forwarded_headers(incoming: &HeaderMap, host: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 2);
    for (name, value) in incoming {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if let Some(value) = host.and_then(|h| HeaderValue::from_str(h).ok()) {
        headers.insert("x-forwarded-host", value);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
    headers
}

/// Route the request through the gateway and stream the upstream response back.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let host = request_host(&parts);

    let forward = state
        .gateway
        .route(RouteRequest {
            path: parts.uri.path(),
            query: parts.uri.query(),
            host: host.as_deref(),
            principal: principal_of(&parts.extensions),
        })
        .await?;

    let body = to_bytes(body, MAX_FORWARD_BODY_BYTES)
        .await
        .map_err(|_| AppError::BadRequest("request body too large".to_string()))?;

    tracing::debug!(route = %forward.route_id, method = %parts.method, "Forwarding request");

    let upstream = state
        .http_client
        .request(parts.method, forward.destination.clone())
        .headers(forwarded_headers(&parts.headers, host.as_deref()))
        .body(body)
        .send()
        .await
        .map_err(|e| {
            let err = classify_reqwest_error(&forward.route_id, &e);
            err.record();
            err
        })?;

    let status = upstream.status();
    metrics::counter!(
        "edge_proxy_requests_total",
        "route" => forward.route_id.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);

    let mut response_headers = HeaderMap::with_capacity(upstream.headers().len());
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            response_headers.append(name.clone(), value.clone());
        }
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;

    if let Some(decision) = &forward.rate_limit {
        state
            .gateway
            .limiter()
            .apply_headers(decision, response.headers_mut());
    }

    Ok(response)
}
