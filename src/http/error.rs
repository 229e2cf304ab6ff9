//! Per-request error translation.
//!
//! # Responsibilities
//! - Carry handler failures as [`HttpError`] values on responses
//! - Turn unmatched routes, rejected methods and panics into errors
//! - Render every error through the configured [`ErrorHandler`]
//!
//! # Design Decisions
//! - Errors travel in response extensions so user middleware outside the
//!   translation layer only ever sees rendered responses
//! - The default body is JSON `{code, message}`

use std::any::Any;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Headers of the original response kept on the rendered error.
const PRESERVED_HEADERS: [HeaderName; 3] =
    [header::ALLOW, header::WWW_AUTHENTICATE, header::RETRY_AFTER];

/// An error raised while handling a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message.clone()).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// The request an error was raised for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub method: Method,
    pub path: String,
}

/// Renders an [`HttpError`] into the response sent to the client.
pub type ErrorHandler = Arc<dyn Fn(&HttpError, &RequestSummary) -> Response + Send + Sync>;

/// JSON body of the default error handler.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// Render `{code, message}`; 404s name the missing resource.
pub fn render_error(error: &HttpError, request: &RequestSummary) -> Response {
    let status = error.status();
    let message = if status == StatusCode::NOT_FOUND {
        format!(r#"Resource "{} {}" not found"#, request.method, request.path)
    } else {
        error.message().to_string()
    };

    (
        status,
        Json(ErrorBody {
            code: status.as_u16(),
            message,
        }),
    )
        .into_response()
}

pub fn default_error_handler() -> ErrorHandler {
    Arc::new(render_error)
}

/// Fallback for requests no route matched.
pub(crate) async fn not_found() -> HttpError {
    HttpError::not_found()
}

/// Largest error body read back when wrapping a plain response as an error.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Middleware rendering errors found on inner responses.
///
/// Besides explicit [`HttpError`]s, any 4xx/5xx response without a JSON body
/// is treated as an error: extractor rejections, bare status codes and the
/// router's own 405s all reach the client through the error handler.
pub(crate) async fn translate_errors(
    State(handler): State<ErrorHandler>,
    request: Request,
    next: Next,
) -> Response {
    let summary = RequestSummary {
        method: request.method().clone(),
        path: request.uri().path().to_string(),
    };

    let response = next.run(request).await;

    let explicit = response.extensions().get::<HttpError>().cloned();
    let (error, headers) = match explicit {
        Some(error) => (error, response.headers().clone()),
        None if is_unrendered_error(&response) => {
            let (parts, body) = response.into_parts();
            let text = match axum::body::to_bytes(body, MAX_ERROR_BODY).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
                Err(_) => String::new(),
            };
            let message = if text.is_empty() {
                parts
                    .status
                    .canonical_reason()
                    .unwrap_or("Unknown Error")
                    .to_string()
            } else {
                text
            };
            (HttpError::new(parts.status, message), parts.headers)
        }
        None => return response,
    };

    let mut rendered = handler(&error, &summary);
    for name in PRESERVED_HEADERS {
        if let Some(value) = headers.get(&name) {
            rendered.headers_mut().insert(name, value.clone());
        }
    }
    rendered
}

/// An error status whose body was not produced by an error renderer.
fn is_unrendered_error(response: &Response) -> bool {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return false;
    }
    !response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.contains("+json"))
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
}

/// Convert a handler panic into an internal error.
pub(crate) fn panic_response(expose: bool) -> impl Fn(Box<dyn Any + Send>) -> Response + Clone {
    move |payload: Box<dyn Any + Send>| {
        let detail = panic_message(payload.as_ref());
        tracing::error!(panic = %detail, "Handler panicked");

        let message = if expose {
            format!("Internal Server Error: {detail}")
        } else {
            "Internal Server Error".to_string()
        };
        HttpError::internal(message).into_response()
    }
}
