//! HTTP basic authentication guard.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use base64::{engine::general_purpose, Engine as _};
use constant_time_eq::constant_time_eq;

use crate::config::schema::BasicAuthSettings;
use crate::http::error::HttpError;
use crate::http::middleware::Middleware;

/// Username/password pair checked against the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_settings(settings: &BasicAuthSettings) -> Self {
        Self::new(settings.username.clone(), settings.password.clone())
    }

    /// Check an `Authorization` header value. Both fields are always
    /// compared, each in constant time.
    pub fn verify(&self, authorization: &str) -> bool {
        let Some(encoded) = authorization.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = general_purpose::STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        match credentials.split_once(':') {
            Some((username, password)) => {
                let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
                let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
                user_ok & pass_ok
            }
            None => false,
        }
    }

    pub fn middleware(&self) -> Middleware {
        let auth = Arc::new(self.clone());
        Middleware::new("basic-auth", move |router: Router| {
            router.layer(from_fn_with_state(auth.clone(), basic_auth_middleware))
        })
    }
}

async fn basic_auth_middleware(
    State(auth): State<Arc<BasicAuth>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|value| auth.verify(value));

    if authorized {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Basic authentication failed");
    let mut response = HttpError::new(StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"Restricted\""),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for(credentials: &str) -> String {
        format!("Basic {}", general_purpose::STANDARD.encode(credentials))
    }

    #[test]
    fn accepts_matching_credentials() {
        let auth = BasicAuth::new("admin", "s3cret:with:colons");
        assert!(auth.verify(&header_for("admin:s3cret:with:colons")));
    }

    #[test]
    fn rejects_everything_else() {
        let auth = BasicAuth::new("admin", "s3cret");
        assert!(!auth.verify(&header_for("admin:wrong")));
        assert!(!auth.verify(&header_for("admin")));
        assert!(!auth.verify("Bearer admin:s3cret"));
        assert!(!auth.verify("Basic !!not-base64!!"));
    }

    #[test]
    fn differing_lengths_and_cases_are_rejected() {
        let auth = BasicAuth::new("admin", "s3cret");
        assert!(!auth.verify(&header_for("admin:s3cret-longer")));
        assert!(!auth.verify(&header_for("Admin:s3cret")));
        assert!(!auth.verify(&header_for(":")));
        assert!(auth.verify(&header_for("admin:s3cret")));
    }
}
