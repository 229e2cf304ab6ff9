//! Bootstrap and request-dispatch layer of an HTTP application server.
//!
//! Modules contribute routes, options shape the server, and one listener
//! can be shared with other protocol servers.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod query;
pub mod routing;

pub use config::{ServerConfig, ServerOption, ServerSettings};
pub use http::{HttpServer, ServeError, ServerError};
pub use lifecycle::LifecycleState;
pub use net::SharedListener;
pub use routing::{Module, RouteGroup, ServiceContext};
