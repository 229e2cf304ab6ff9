//! Service modules and the context the server is composed from.

use std::fmt;
use std::sync::Arc;

use crate::http::middleware::Middleware;
use crate::query::QueryEngine;
use crate::routing::group::RouteGroup;

/// Protocol identifier of an application server mounting a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKind {
    /// This HTTP server.
    Rest,
    /// An RPC server sharing the process.
    Grpc,
    /// A standalone query-protocol server.
    GraphQl,
}

impl ServerKind {
    /// Protocol name used in logs and by modules.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Rest => "rest",
            ServerKind::Grpc => "grpc",
            ServerKind::GraphQl => "graphql",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Declarative route registration.
pub trait RestHandler: Send + Sync {
    fn mount(&self, group: &mut RouteGroup<'_>);
}

/// Registration against the routing engine itself, for routes the
/// declarative form cannot express.
pub trait ServerHandler: Send + Sync {
    fn mount_handlers(&self, group: &mut RouteGroup<'_>);
}

/// An independently developed unit contributing routes.
///
/// Both hooks are optional; a module exposing neither contributes nothing.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn rest_handler(&self) -> Option<&dyn RestHandler> {
        None
    }

    fn server_handler(&self, kind: ServerKind) -> Option<&dyn ServerHandler> {
        let _ = kind;
        None
    }
}

/// Everything the server is composed from besides its options.
///
/// The basic-auth middleware guarding `/memstats` is handed in here rather
/// than looked up.
#[derive(Clone)]
pub struct ServiceContext {
    name: String,
    modules: Vec<Arc<dyn Module>>,
    basic_auth: Middleware,
    query_engine: Option<Arc<dyn QueryEngine>>,
}

impl ServiceContext {
    pub fn new(name: impl Into<String>, basic_auth: Middleware) -> Self {
        Self {
            name: name.into(),
            modules: Vec::new(),
            basic_auth,
            query_engine: None,
        }
    }

    /// Append a module; modules mount in the order they were added.
    pub fn with_module(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_query_engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.query_engine = Some(engine);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    pub fn basic_auth(&self) -> &Middleware {
        &self.basic_auth
    }

    pub fn query_engine(&self) -> Option<&Arc<dyn QueryEngine>> {
        self.query_engine.as_ref()
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("name", &self.name)
            .field(
                "modules",
                &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("basic_auth", &self.basic_auth.name())
            .field("query_engine", &self.query_engine.is_some())
            .finish()
    }
}
