//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Request spans and request ids come from the tracer middleware
//! (http::middleware::trace).
//! ```

pub mod logging;
pub mod metrics;
