//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (net layer)
//!     → server.rs (hyper-util connection, lifecycle)
//!     → middleware/ (cors → tracer → logger → user middleware)
//!     → error.rs (error translation, panic recovery)
//!     → routes: handlers.rs built-ins, module routes, query protocol
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use error::{ErrorHandler, HttpError, RequestSummary};
pub use middleware::{BasicAuth, Middleware};
pub use server::{HttpServer, ServeError, ServerError};
