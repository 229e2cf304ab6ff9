//! Embedded query-protocol (GraphQL) endpoint.
//!
//! The engine itself lives outside this crate; the server only needs the
//! three request handlers it produces:
//!
//! ```text
//! ANY {prefix}/graphql             → execute
//! GET {prefix}/graphql/playground  → interactive exploration UI
//! GET {prefix}/graphql/voyager     → schema visualization UI
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::Request;
use axum::handler::Handler;
use axum::response::Response;
use tower::util::BoxCloneSyncService;

use crate::routing::Module;

/// A type-erased request handler produced by a query engine.
pub type QueryService = BoxCloneSyncService<Request, Response, Infallible>;

/// Wrap an axum handler into a [`QueryService`].
pub fn query_service<H, T>(handler: H) -> QueryService
where
    H: Handler<T, ()> + Sync,
    T: 'static,
{
    BoxCloneSyncService::new(handler.with_state(()))
}

/// Handlers yielded by a [`QueryEngine`].
#[derive(Clone)]
pub struct QueryHandlers {
    pub execute: QueryService,
    pub playground: QueryService,
    pub voyager: QueryService,
}

/// A schema-driven query engine built from the service's modules.
pub trait QueryEngine: Send + Sync {
    fn handlers(&self, modules: &[Arc<dyn Module>], options: &QueryOptions) -> QueryHandlers;
}

/// Sub-options handed to the query engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Reject schema introspection queries.
    pub disable_introspection: bool,

    /// Title shown by the playground UI.
    pub playground_title: String,

    /// Maximum selection depth, unbounded when `None`.
    pub max_depth: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            disable_introspection: false,
            playground_title: "GraphQL Playground".to_string(),
            max_depth: None,
        }
    }
}

/// A transformation of [`QueryOptions`], applied in call order.
pub struct QueryOption(Box<dyn FnOnce(QueryOptions) -> QueryOptions + Send>);

impl QueryOption {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(QueryOptions) -> QueryOptions + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn apply(self, options: QueryOptions) -> QueryOptions {
        (self.0)(options)
    }
}

pub fn disable_introspection(disabled: bool) -> QueryOption {
    QueryOption::new(move |mut o| {
        o.disable_introspection = disabled;
        o
    })
}

pub fn playground_title(title: impl Into<String>) -> QueryOption {
    let title = title.into();
    QueryOption::new(move |mut o| {
        o.playground_title = title;
        o
    })
}

pub fn max_depth(depth: usize) -> QueryOption {
    QueryOption::new(move |mut o| {
        o.max_depth = Some(depth);
        o
    })
}
