//! The listener an HTTP server accepts from.
//!
//! # Responsibilities
//! - Bind a dedicated listener, or wrap a sub-listener claimed from a
//!   [`SharedListener`](crate::net::mux::SharedListener)
//! - Present both as one stream type to the serve loop
//! - Classify accept errors as benign or not

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::net::mux::{MuxError, SubListener};
use crate::net::stream::PrefixedStream;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),
    /// The shared sub-listener was closed. Not a failure.
    #[error("listener closed")]
    Closed,
}

/// Errors that concern one connection only; the listener stays usable.
pub fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Where an HTTP server's connections come from.
#[derive(Debug)]
pub enum ServerListener {
    /// Bound and dropped by the server itself.
    Owned(TcpListener),
    /// Claimed from a shared listener; the root listener belongs to
    /// whoever runs the multiplexer.
    Shared(SubListener),
}

impl ServerListener {
    /// Bind `0.0.0.0:{port}`.
    pub async fn bind(port: u16) -> Result<Self, ListenerError> {
        Self::bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
    }

    pub async fn bind_addr(addr: SocketAddr) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::info!(address = %addr, "Listener bound");
        Ok(ServerListener::Owned(listener))
    }

    pub async fn accept(&mut self) -> Result<(PrefixedStream, SocketAddr), ListenerError> {
        match self {
            ServerListener::Owned(listener) => {
                let (stream, peer) = listener.accept().await.map_err(ListenerError::Accept)?;
                Ok((PrefixedStream::plain(stream), peer))
            }
            ServerListener::Shared(sub) => sub.accept().await.map_err(|e| match e {
                MuxError::Io(e) => ListenerError::Accept(e),
                _ => ListenerError::Closed,
            }),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            ServerListener::Owned(listener) => listener.local_addr(),
            ServerListener::Shared(sub) => Ok(sub.local_addr()),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ServerListener::Shared(_))
    }

    /// Stop accepting. An owned socket is closed; a shared one only loses
    /// this sub-stream.
    pub fn close(self) {
        match self {
            ServerListener::Owned(listener) => drop(listener),
            ServerListener::Shared(mut sub) => sub.close(),
        }
    }
}
