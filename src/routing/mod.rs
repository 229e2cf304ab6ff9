//! Route composition subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceContext (ordered modules)
//!     → module.rs (RestHandler::mount, then ServerHandler::mount_handlers)
//!     → group.rs (RouteGroup under the path prefix, nested groups, raw mounts)
//!     → table.rs (record entries, reject duplicates, diagnostic listing)
//!     → axum Router (frozen before serving)
//! ```
//!
//! # Design Decisions
//! - Modules mount in input order, each hook at most once
//! - Routes compiled at startup, immutable at runtime
//! - Duplicate method + path: first registration wins, construction fails
//! - Listing is sorted by path for deterministic output

pub mod group;
pub mod module;
pub mod table;

pub use group::RouteGroup;
pub use module::{Module, RestHandler, ServerHandler, ServerKind, ServiceContext};
pub use table::{RouteEntry, RouteError, RouteKind, RouteMethod, RouteTable};
