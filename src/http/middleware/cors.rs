//! Cross-origin policy enforcement.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::schema::CorsSettings;
use crate::http::middleware::Middleware;

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v == "*")
}

/// Build the CORS layer.
///
/// Wildcards are mirrored from the request when credentials are allowed,
/// since browsers reject `*` together with credentials. Unparseable entries
/// are skipped with a warning.
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let credentials = settings.allow_credentials;

    let origins = if is_wildcard(&settings.allow_origins) {
        if credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        AllowOrigin::list(settings.allow_origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|e| tracing::warn!(origin = %origin, error = %e, "Ignoring CORS origin"))
                .ok()
        }))
    };

    let methods = if is_wildcard(&settings.allow_methods) {
        if credentials {
            AllowMethods::mirror_request()
        } else {
            AllowMethods::any()
        }
    } else {
        AllowMethods::list(settings.allow_methods.iter().filter_map(|method| {
            Method::from_bytes(method.as_bytes())
                .inspect_err(|e| tracing::warn!(method = %method, error = %e, "Ignoring CORS method"))
                .ok()
        }))
    };

    let headers = if is_wildcard(&settings.allow_headers) {
        if credentials {
            AllowHeaders::mirror_request()
        } else {
            AllowHeaders::any()
        }
    } else {
        AllowHeaders::list(settings.allow_headers.iter().filter_map(|header| {
            HeaderName::from_bytes(header.as_bytes())
                .inspect_err(|e| tracing::warn!(header = %header, error = %e, "Ignoring CORS header"))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(credentials)
}

pub fn cors(settings: &CorsSettings) -> Middleware {
    Middleware::from_layer("cors", cors_layer(settings))
}
