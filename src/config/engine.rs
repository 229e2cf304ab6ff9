//! Serving engine tuning.

use std::time::Duration;

use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto::Builder;

/// Knobs of the connection engine, adjusted through
/// [`with_engine_tuning`](crate::config::options::with_engine_tuning).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Maximum concurrent connections (backpressure on accept).
    pub max_connections: usize,

    /// Keep HTTP/1 connections open between requests.
    pub http1_keep_alive: bool,

    /// Close HTTP/1 connections that do not send a full header in time.
    pub header_read_timeout: Option<Duration>,

    /// Concurrent stream limit for HTTP/2 connections.
    pub http2_max_concurrent_streams: Option<u32>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            http1_keep_alive: true,
            header_read_timeout: Some(Duration::from_secs(30)),
            http2_max_concurrent_streams: None,
        }
    }
}

impl EngineSettings {
    /// Build the per-connection protocol builder (HTTP/1 and HTTP/2).
    pub(crate) fn connection_builder(&self) -> Builder<TokioExecutor> {
        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .keep_alive(self.http1_keep_alive);
        if let Some(timeout) = self.header_read_timeout {
            builder.http1().header_read_timeout(timeout);
        }
        if let Some(streams) = self.http2_max_concurrent_streams {
            builder.http2().max_concurrent_streams(streams);
        }
        builder
    }
}
