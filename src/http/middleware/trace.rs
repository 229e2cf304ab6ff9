//! Distributed-tracing instrumentation.
//!
//! # Responsibilities
//! - Assign an `x-request-id` (UUID v4) unless the client sent one
//! - Open one span per request, skipping excluded paths
//! - Record request and response payloads on the span, truncated to
//!   [`ChainContext::max_log_size`] bytes
//! - Echo the request id on the response

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::Router;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::field::Empty;
use tracing::Span;
use uuid::Uuid;

use crate::config::schema::TraceSettings;
use crate::http::middleware::{ChainContext, Middleware};

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Bodies above this size, or of unknown size, are streamed untouched.
const MAX_BUFFERED_BODY: u64 = 64 * 1024;

/// Generates UUID v4 request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTraceId;

impl MakeRequestId for MakeTraceId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Read the request id assigned by [`tracer`].
pub fn request_id<B>(request: &axum::http::Request<B>) -> Option<&str> {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
}

pub fn tracer(settings: &TraceSettings) -> Middleware {
    let excluded: Arc<HashSet<String>> =
        Arc::new(settings.exclude_paths.iter().cloned().collect());

    Middleware::new("tracer", move |router: Router| {
        let excluded = excluded.clone();
        let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request| {
            if excluded.contains(request.uri().path()) {
                return Span::none();
            }
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = request_id(request).unwrap_or("unknown"),
                request_body = Empty,
                response_body = Empty,
            )
        });

        router
            .layer(from_fn(record_payloads))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(trace)
            .layer(SetRequestIdLayer::x_request_id(MakeTraceId))
    })
}

async fn record_payloads(request: Request, next: Next) -> Response {
    let span = Span::current();
    let max = ChainContext::of(&request).max_log_size;
    if max == 0 || span.is_disabled() {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let (body, payload) = capture(body, max).await;
    if let Some(payload) = payload {
        span.record("request_body", payload.as_str());
    }

    let response = next.run(Request::from_parts(parts, body)).await;

    let (parts, body) = response.into_parts();
    let (body, payload) = capture(body, max).await;
    if let Some(payload) = payload {
        span.record("response_body", payload.as_str());
    }
    Response::from_parts(parts, body)
}

/// Buffer a small body of known size and return it with its truncated text.
async fn capture(body: Body, max: usize) -> (Body, Option<String>) {
    let len = match body.size_hint().exact() {
        Some(len) if len <= MAX_BUFFERED_BODY => len,
        _ => return (body, None),
    };
    match axum::body::to_bytes(body, len as usize).await {
        Ok(bytes) => {
            let payload = truncate_payload(&bytes, max);
            (Body::from(bytes), Some(payload))
        }
        // The peer is gone; nothing downstream can read this body either.
        Err(e) => {
            tracing::debug!(error = %e, "Failed to buffer payload for tracing");
            (Body::empty(), None)
        }
    }
}

/// At most `max` bytes of `payload` as text, marked when cut.
pub fn truncate_payload(payload: &[u8], max: usize) -> String {
    if payload.len() <= max {
        return String::from_utf8_lossy(payload).into_owned();
    }
    let mut text = String::from_utf8_lossy(&payload[..max]).into_owned();
    text.push_str("...");
    text
}
