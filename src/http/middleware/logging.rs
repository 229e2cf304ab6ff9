//! Request/response logging.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::Router;

use crate::http::middleware::trace::request_id;
use crate::http::middleware::{ChainContext, Middleware};
use crate::observability::metrics;

/// One event per request. Outside debug mode only server errors are logged.
pub fn request_logger() -> Middleware {
    Middleware::new("logger", |router: Router| router.layer(from_fn(log_request)))
}

async fn log_request(request: Request, next: Next) -> Response {
    let debug = ChainContext::of(&request).debug;
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request_id(&request).unwrap_or("unknown").to_string();

    let response = next.run(request).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::record_request(method.as_str(), status.as_u16(), start);

    if status.is_server_error() {
        tracing::error!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms,
            "Request failed"
        );
    } else if debug {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms,
            "Request completed"
        );
    }

    response
}
