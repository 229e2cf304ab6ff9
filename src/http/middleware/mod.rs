//! Request-wrapping middleware.
//!
//! A [`Middleware`] is a named function from one router to a wrapped router.
//! Chains run outer-to-inner in list order:
//!
//! ```text
//! request → cors → tracer → logger → (error translation) → handler
//! ```
//!
//! Tracing observes the post-CORS request and logging observes the final
//! response, including statuses set by outer layers' error translation.
//!
//! Built-in middleware read the resolved server values from the request's
//! [`ChainContext`] rather than capturing them when the chain is assembled,
//! so options applied after the defaults still reach them.

pub mod basic_auth;
pub mod cors;
pub mod logging;
pub mod trace;

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::Route;
use axum::Router;
use tower::{Layer, Service};

use crate::config::schema::DEFAULT_MAX_LOG_SIZE;
use crate::config::ServerSettings;

pub use basic_auth::BasicAuth;

/// Resolved server values visible to middleware through request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainContext {
    /// Log every request, not only server errors.
    pub debug: bool,

    /// Bytes of request/response payload recorded on the trace span.
    /// Zero disables payload recording.
    pub max_log_size: usize,
}

impl ChainContext {
    /// The context the server attached to `request`, or the defaults.
    pub fn of<B>(request: &axum::http::Request<B>) -> Self {
        request
            .extensions()
            .get::<ChainContext>()
            .copied()
            .unwrap_or_default()
    }
}

impl Default for ChainContext {
    fn default() -> Self {
        Self {
            debug: true,
            max_log_size: DEFAULT_MAX_LOG_SIZE,
        }
    }
}

/// A named request wrapper.
#[derive(Clone)]
pub struct Middleware {
    name: Cow<'static, str>,
    wrap: Arc<dyn Fn(Router) -> Router + Send + Sync>,
}

impl Middleware {
    /// Create a middleware from a router transformation.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, wrap: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            wrap: Arc::new(wrap),
        }
    }

    /// Create a middleware from a tower layer.
    pub fn from_layer<L>(name: impl Into<Cow<'static, str>>, layer: L) -> Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(name, move |router: Router| router.layer(layer.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap `router` with this middleware.
    pub fn wrap(&self, router: Router) -> Router {
        (self.wrap)(router)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// Wrap `router` so that `chain[0]` is the outermost layer.
pub fn apply_chain(router: Router, chain: &[Middleware]) -> Router {
    chain.iter().rev().fold(router, |router, middleware| middleware.wrap(router))
}

/// CORS, then tracing, then request logging.
pub fn default_chain(settings: &ServerSettings) -> Vec<Middleware> {
    vec![
        cors::cors(&settings.cors),
        trace::tracer(&settings.tracing),
        logging::request_logger(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::Next;
    use axum::routing::get;
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn recording(name: &'static str, seen: Arc<Mutex<Vec<&'static str>>>) -> Middleware {
        Middleware::new(name, move |router: Router| {
            let seen = seen.clone();
            router.layer(axum::middleware::from_fn(move |req: Request<Body>, next: Next| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(name);
                    next.run(req).await
                }
            }))
        })
    }

    #[tokio::test]
    async fn first_entry_is_outermost() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![
            recording("outer", seen.clone()),
            recording("middle", seen.clone()),
            recording("inner", seen.clone()),
        ];
        let router = apply_chain(Router::new().route("/", get(|| async { "ok" })), &chain);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        router.oneshot(request).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["outer", "middle", "inner"]);
    }

    #[test]
    fn default_chain_order() {
        let names: Vec<String> = default_chain(&ServerSettings::default())
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, vec!["cors", "tracer", "logger"]);
    }
}
