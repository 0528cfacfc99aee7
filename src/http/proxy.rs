//! Request forwarding with retry and failover.
//!
//! # Responsibilities
//! - Select a backend per attempt via the configured strategy
//! - Forward the request with the chosen backend's own timeout
//! - On transport failure: feed the backend's failure counter, back off
//!   briefly, and reselect, up to a fixed attempt ceiling
//! - Synthesize 503 when no backend is selectable or attempts run out

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, request::Parts, HeaderMap, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use uuid::Uuid;

use crate::load_balancer::{Backend, Balancer, BackendPool, SelectionError};
use crate::observability::metrics;

/// Retry ceiling: one initial attempt plus at most this many retries.
pub const MAX_RETRIES: u32 = 3;

/// Fixed pause between attempts; enough for round robin to move on.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Cap on the buffered request body. Bodies within the cap are buffered up
/// front so a retry can resend them; larger or chunked bodies are streamed
/// to a single backend attempt instead, since they cannot be replayed.
/// Retries only ever happen before any response byte has been streamed.
const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

/// Shared state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BackendPool>,
    pub balancer: Arc<dyn Balancer>,
    pub client: Client<HttpConnector, Body>,
    pub unhealthy_threshold: u8,
}

/// Main proxy handler: select, forward, retry.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let (parts, body) = request.into_parts();

    if !body_fits_buffer(&parts.headers) {
        return forward_streaming(state, parts, body, request_id, &method, start_time).await;
    }

    let body_bytes = match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) if is_length_limit(&e) => {
            // the body outgrew what its content-length declared
            tracing::warn!(request_id = %request_id, error = %e, "Request body exceeded declared length");
            return (StatusCode::BAD_REQUEST, "Request body exceeded declared length")
                .into_response();
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    tracing::debug!(request_id = %request_id, method = %method, path = %path, "Proxying request");

    let mut attempts: u32 = 0;
    loop {
        if attempts > MAX_RETRIES {
            tracing::warn!(request_id = %request_id, path = %path, "Max attempts reached, terminating");
            metrics::record_request(&method, 503, "none", start_time);
            return (StatusCode::SERVICE_UNAVAILABLE, "Service not available").into_response();
        }

        let snapshot = state.pool.snapshot();
        let backend = match state.balancer.select(&snapshot) {
            Ok(backend) => backend,
            Err(SelectionError::NoBackendAvailable) => {
                tracing::warn!(request_id = %request_id, backends = snapshot.len(), "No backend available");
                metrics::record_request(&method, 503, "none", start_time);
                return (StatusCode::SERVICE_UNAVAILABLE, "Service not available").into_response();
            }
            Err(SelectionError::Internal(reason)) => {
                tracing::error!(request_id = %request_id, reason = %reason, "Backend selection failed");
                metrics::record_request(&method, 500, "none", start_time);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to select backend").into_response();
            }
        };

        let upstream = match build_upstream_request(&parts, &backend, &body_bytes, request_id) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
                metrics::record_request(&method, 500, backend.url.as_str(), start_time);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build upstream request")
                    .into_response();
            }
        };

        match tokio::time::timeout(backend.timeout, state.client.request(upstream)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                tracing::debug!(
                    request_id = %request_id,
                    backend = %backend.url,
                    status = %status,
                    attempt = attempts,
                    "Upstream responded"
                );
                metrics::record_request(&method, status.as_u16(), backend.url.as_str(), start_time);

                let (response_parts, response_body) = response.into_parts();
                return Response::from_parts(response_parts, Body::new(response_body));
            }
            Ok(Err(e)) => {
                tracing::warn!(request_id = %request_id, backend = %backend.url, error = %e, attempt = attempts, "Upstream transport error");
            }
            Err(_) => {
                tracing::warn!(request_id = %request_id, backend = %backend.url, timeout = ?backend.timeout, attempt = attempts, "Upstream timed out");
            }
        }

        // passive health signal, independent of the periodic checker
        backend.record_failure(state.unhealthy_threshold);
        tokio::time::sleep(RETRY_BACKOFF).await;
        attempts += 1;
    }
}

/// Whether the request body can be held in the replay buffer: a declared
/// content-length within the cap, or no body headers at all. Chunked
/// transfers have no declared length and stream instead.
fn body_fits_buffer(headers: &HeaderMap) -> bool {
    let chunked = headers
        .get(header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return false;
    }

    match headers.get(header::CONTENT_LENGTH) {
        None => true,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .is_some_and(|len| len <= MAX_BUFFERED_BODY),
    }
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Forward a request whose body cannot be buffered. The body is consumed
/// as it streams upstream, so there is exactly one attempt: a transport
/// failure feeds the backend's failure counter and surfaces as 503.
async fn forward_streaming(
    state: AppState,
    parts: Parts,
    body: Body,
    request_id: Uuid,
    method: &str,
    start_time: Instant,
) -> Response {
    let snapshot = state.pool.snapshot();
    let backend = match state.balancer.select(&snapshot) {
        Ok(backend) => backend,
        Err(SelectionError::NoBackendAvailable) => {
            tracing::warn!(request_id = %request_id, backends = snapshot.len(), "No backend available");
            metrics::record_request(method, 503, "none", start_time);
            return (StatusCode::SERVICE_UNAVAILABLE, "Service not available").into_response();
        }
        Err(SelectionError::Internal(reason)) => {
            tracing::error!(request_id = %request_id, reason = %reason, "Backend selection failed");
            metrics::record_request(method, 500, "none", start_time);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to select backend").into_response();
        }
    };

    let mut upstream = Request::from_parts(parts, body);
    match upstream_uri(&backend, upstream.uri()) {
        Ok(uri) => *upstream.uri_mut() = uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
            metrics::record_request(method, 500, backend.url.as_str(), start_time);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build upstream request")
                .into_response();
        }
    }
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        upstream.headers_mut().insert("x-request-id", value);
    }

    match tokio::time::timeout(backend.timeout, state.client.request(upstream)).await {
        Ok(Ok(response)) => {
            let status = response.status();
            tracing::debug!(
                request_id = %request_id,
                backend = %backend.url,
                status = %status,
                "Upstream responded to streamed request"
            );
            metrics::record_request(method, status.as_u16(), backend.url.as_str(), start_time);

            let (response_parts, response_body) = response.into_parts();
            Response::from_parts(response_parts, Body::new(response_body))
        }
        Ok(Err(e)) => {
            tracing::warn!(request_id = %request_id, backend = %backend.url, error = %e, "Streamed upstream transport error");
            backend.record_failure(state.unhealthy_threshold);
            metrics::record_request(method, 503, backend.url.as_str(), start_time);
            (StatusCode::SERVICE_UNAVAILABLE, "Service not available").into_response()
        }
        Err(_) => {
            tracing::warn!(request_id = %request_id, backend = %backend.url, timeout = ?backend.timeout, "Streamed upstream timed out");
            backend.record_failure(state.unhealthy_threshold);
            metrics::record_request(method, 503, backend.url.as_str(), start_time);
            (StatusCode::SERVICE_UNAVAILABLE, "Service not available").into_response()
        }
    }
}

/// Rebuild the inbound request against the chosen backend: scheme and
/// authority come from the backend URL and its path prefix is prepended,
/// everything else is forwarded unchanged.
fn build_upstream_request(
    parts: &Parts,
    backend: &Backend,
    body: &Bytes,
    request_id: Uuid,
) -> Result<Request<Body>, axum::http::Error> {
    let uri = upstream_uri(backend, &parts.uri)?;

    let mut builder = Request::builder()
        .method(parts.method.clone())
        .version(parts.version)
        .uri(uri);

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            headers.insert("x-request-id", value);
        }
    }

    builder.body(Body::from(body.clone()))
}

fn upstream_uri(backend: &Backend, original: &Uri) -> Result<Uri, axum::http::Error> {
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");

    // backend.url carries scheme://host:port plus an optional path prefix
    let target = format!(
        "{}{}",
        backend.url.as_str().trim_end_matches('/'),
        path_and_query
    );
    Ok(Uri::from_str(&target)?)
}
