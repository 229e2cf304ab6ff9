//! Route group handle passed to module mount hooks.

use std::any::type_name;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{any, on, MethodFilter, MethodRouter};
use axum::Router;

use crate::http::error::panic_message;
use crate::http::middleware::{apply_chain, Middleware};
use crate::routing::table::{RouteEntry, RouteError, RouteKind, RouteMethod, RouteTable};

/// Normalize a path prefix: leading slash, no trailing slash, `""` for root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Join a normalized prefix and a route path.
pub fn join_path(prefix: &str, path: &str) -> String {
    if path.is_empty() || path == "/" {
        return if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        };
    }
    if path.starts_with('/') {
        format!("{prefix}{path}")
    } else {
        format!("{prefix}/{path}")
    }
}

/// Check a full route path against the routing engine's capture syntax.
fn validate_path(path: &str) -> Result<(), String> {
    for segment in path.split('/') {
        if segment.starts_with(':') {
            return Err(format!(
                "segment `{segment}` uses `:` captures; write `{{{}}}` instead",
                &segment[1..]
            ));
        }
        if segment.starts_with('*') {
            return Err(format!(
                "segment `{segment}` uses `*` wildcards; write `{{*{}}}` instead",
                &segment[1..]
            ));
        }
        if segment.starts_with("{*") && !path.ends_with(segment) {
            return Err(format!("wildcard `{segment}` must be the last segment"));
        }
    }
    Ok(())
}

/// Run one routing-engine step. An engine panic becomes a [`RouteError`]
/// and leaves the router as it was before the step.
fn engine_step<F>(router: Router, scope: &str, errors: &mut Vec<RouteError>, step: F) -> Router
where
    F: FnOnce(Router) -> Router,
{
    let before = router.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| step(router))) {
        Ok(router) => router,
        Err(payload) => {
            let message = panic_message(payload.as_ref()).to_string();
            tracing::warn!(path = %scope, error = %message, "Routing engine rejected route");
            errors.push(RouteError::Engine {
                path: scope.to_string(),
                message,
            });
            before
        }
    }
}

/// A set of routes sharing a path prefix and group middleware.
///
/// Paths are recorded in full (prefix included) in the server's
/// [`RouteTable`]. A registration that collides with an earlier one is
/// dropped and reported when the server finishes composing.
pub struct RouteGroup<'t> {
    table: &'t mut RouteTable,
    errors: &'t mut Vec<RouteError>,
    prefix: String,
    endpoints: BTreeMap<String, MethodRouter>,
    routers: Vec<Router>,
    middlewares: Vec<Middleware>,
}

impl<'t> RouteGroup<'t> {
    pub(crate) fn new(
        table: &'t mut RouteTable,
        errors: &'t mut Vec<RouteError>,
        prefix: &str,
    ) -> Self {
        Self {
            table,
            errors,
            prefix: normalize_prefix(prefix),
            endpoints: BTreeMap::new(),
            routers: Vec::new(),
            middlewares: Vec::new(),
        }
    }

    /// The group's full path prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register `handler` for `method` on `path`, relative to the prefix.
    pub fn route<H, T>(&mut self, method: Method, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let filter = match MethodFilter::try_from(method.clone()) {
            Ok(filter) => filter,
            Err(_) => {
                let path = join_path(&self.prefix, path);
                self.errors.push(RouteError::UnsupportedMethod { method, path });
                return self;
            }
        };
        self.mount(RouteMethod::Only(method), path, type_name::<H>(), on(filter, handler))
    }

    pub fn get<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn put<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route(Method::PUT, path, handler)
    }

    pub fn patch<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route(Method::PATCH, path, handler)
    }

    pub fn delete<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route(Method::DELETE, path, handler)
    }

    /// Register `handler` for every method on `path`.
    pub fn any<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.mount(RouteMethod::Any, path, type_name::<H>(), any(handler))
    }

    /// Register a prepared endpoint under an explicit name.
    pub(crate) fn mount(
        &mut self,
        method: RouteMethod,
        path: &str,
        name: &str,
        endpoint: MethodRouter,
    ) -> &mut Self {
        let path = join_path(&self.prefix, path);
        if let Err(reason) = validate_path(&path) {
            tracing::warn!(path = %path, error = %reason, "Route rejected");
            self.errors.push(RouteError::InvalidPath { path, reason });
            return self;
        }
        let entry = RouteEntry {
            method,
            path: path.clone(),
            name: name.to_string(),
            order: self.table.next_order(),
            kind: RouteKind::Handler,
        };
        if let Err(e) = self.table.record(entry) {
            tracing::warn!(error = %e, "Route rejected");
            self.errors.push(e);
            return self;
        }

        let endpoint = match self.endpoints.remove(&path) {
            Some(existing) => existing.merge(endpoint),
            None => endpoint,
        };
        self.endpoints.insert(path, endpoint);
        self
    }

    /// Wrap every route of this group, including those registered later.
    /// The first middleware added is the outermost.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Build a nested group under `prefix`.
    pub fn group<F>(&mut self, prefix: &str, build: F) -> &mut Self
    where
        F: FnOnce(&mut RouteGroup<'_>),
    {
        let prefix = normalize_prefix(&join_path(&self.prefix, prefix));
        self.record_artifact(&prefix, "group");

        let mut child = RouteGroup::new(&mut *self.table, &mut *self.errors, &prefix);
        build(&mut child);
        let router = child.into_router();
        self.routers.push(router);
        self
    }

    /// Mount routes straight onto the routing engine, relative to the prefix.
    ///
    /// Raw routes are opaque to the route table: only the mount itself is
    /// recorded. Anything the engine refuses, inside the mount or when it is
    /// merged with the group's other routes, fails composition.
    pub fn raw<F>(&mut self, mount: F) -> &mut Self
    where
        F: FnOnce(Router) -> Router,
    {
        let prefix = self.prefix.clone();
        self.record_artifact(&prefix, "raw");

        let scope = if prefix.is_empty() { "/" } else { prefix.as_str() };
        let router = engine_step(Router::new(), scope, self.errors, |router| {
            let router = mount(router);
            if prefix.is_empty() {
                router
            } else {
                Router::new().nest(&prefix, router)
            }
        });
        self.routers.push(router);
        self
    }

    fn record_artifact(&mut self, prefix: &str, what: &str) {
        let entry = RouteEntry {
            method: RouteMethod::Any,
            path: format!("{prefix}/*"),
            name: format!("({what}) {}", if prefix.is_empty() { "/" } else { prefix }),
            order: self.table.next_order(),
            kind: RouteKind::Group,
        };
        // Artifacts are never checked for conflicts.
        let _ = self.table.record(entry);
    }

    pub(crate) fn into_router(self) -> Router {
        let RouteGroup {
            errors,
            prefix,
            endpoints,
            routers,
            middlewares,
            ..
        } = self;

        let mut router = Router::new();
        for (path, endpoint) in endpoints {
            router = engine_step(router, &path, errors, |r| r.route(&path, endpoint));
        }
        let scope = if prefix.is_empty() { "/" } else { prefix.as_str() };
        for nested in routers {
            router = engine_step(router, scope, errors, |r| r.merge(nested));
        }
        apply_chain(router, &middlewares)
    }
}
