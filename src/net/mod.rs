//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Dedicated port:
//!     listener.rs (ServerListener::Owned) → serve loop
//!
//! Shared port:
//!     mux.rs (SharedListener accept loop)
//!     → matcher.rs (protocol sniffing)
//!     → stream.rs (replay sniffed bytes)
//!     → listener.rs (ServerListener::Shared) → serve loop
//!
//! Serve loop:
//!     connection.rs (slot reserved, connection tracked until closed)
//! ```
//!
//! # Design Decisions
//! - Connection slots are bounded; a full server stops accepting
//! - Both listener kinds yield the same stream type
//! - Closing a shared sub-listener never closes the root socket

pub mod connection;
pub mod listener;
pub mod matcher;
pub mod mux;
pub mod stream;

pub use listener::{ListenerError, ServerListener};
pub use matcher::{AnyMatcher, Http1Matcher, Http2Matcher, MatchOutcome, Matcher, PrefixMatcher};
pub use mux::{MuxError, SharedListener, SubListener};
pub use stream::PrefixedStream;
