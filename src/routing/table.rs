//! Recorded route table and startup diagnostics.
//!
//! # Responsibilities
//! - Record every registered route with its mount order
//! - Detect duplicate method + path registrations
//! - Produce the sorted diagnostic listing printed at startup

use std::fmt;

use axum::http::Method;

/// Paths left out of the diagnostic listing.
const UNLISTED_PATHS: [&str; 2] = ["/", "/memstats"];

/// Method a route answers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    /// Every method.
    Any,
    /// A single method.
    Only(Method),
}

impl RouteMethod {
    /// Whether two registrations would answer the same request.
    pub fn overlaps(&self, other: &RouteMethod) -> bool {
        match (self, other) {
            (RouteMethod::Any, _) | (_, RouteMethod::Any) => true,
            (RouteMethod::Only(a), RouteMethod::Only(b)) => a == b,
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMethod::Any => f.pad("ANY"),
            RouteMethod::Only(method) => f.pad(method.as_str()),
        }
    }
}

/// What a recorded entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// A leaf request handler.
    Handler,
    /// A structural artifact (nested group or raw mount).
    Group,
}

/// One registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: RouteMethod,
    pub path: String,
    pub name: String,
    pub order: usize,
    pub kind: RouteKind,
}

impl RouteEntry {
    fn conflicts_with(&self, other: &RouteEntry) -> bool {
        self.kind == RouteKind::Handler
            && other.kind == RouteKind::Handler
            && self.path == other.path
            && self.method.overlaps(&other.method)
    }
}

/// Error raised while composing routes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouteError {
    #[error("route {method} {path} registered by {existing} is registered again by {duplicate}")]
    Conflict {
        method: RouteMethod,
        path: String,
        existing: String,
        duplicate: String,
    },
    #[error("route {path} uses unsupported method {method}")]
    UnsupportedMethod { method: Method, path: String },
    #[error("route {path} is not a valid path: {reason}")]
    InvalidPath { path: String, reason: String },
    /// The routing engine refused a registration the table could not see,
    /// such as a raw mount overlapping a declared route.
    #[error("routing engine rejected {path}: {message}")]
    Engine { path: String, message: String },
}

/// Every route of a server in mount order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry, rejecting it if a handler already answers the same
    /// method and path. The first registration wins.
    pub(crate) fn record(&mut self, entry: RouteEntry) -> Result<(), RouteError> {
        if let Some(existing) = self.entries.iter().find(|e| e.conflicts_with(&entry)) {
            return Err(RouteError::Conflict {
                method: entry.method,
                path: entry.path,
                existing: existing.name.clone(),
                duplicate: entry.name,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Next mount order to hand out.
    pub(crate) fn next_order(&self) -> usize {
        self.entries.len()
    }

    /// All entries in mount order, artifacts included.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Leaf handlers except `/` and `/memstats`, sorted by path.
    pub fn listing(&self) -> Vec<&RouteEntry> {
        let mut listed: Vec<&RouteEntry> = self
            .entries
            .iter()
            .filter(|e| e.kind == RouteKind::Handler && !UNLISTED_PATHS.contains(&e.path.as_str()))
            .collect();
        listed.sort_by(|a, b| a.path.cmp(&b.path).then(a.order.cmp(&b.order)));
        listed
    }

    /// Print the listing, one route per line.
    pub fn log_listing(&self) {
        for entry in self.listing() {
            tracing::info!(
                "[REST-ROUTE] {:<6} {:<30} --> {}",
                entry.method,
                entry.path,
                entry.name
            );
        }
    }
}
