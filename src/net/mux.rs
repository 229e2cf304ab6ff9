//! One TCP listener demultiplexed among protocol servers.
//!
//! # Data Flow
//! ```text
//! SharedListener::serve (root accept loop)
//!     → one sniff task per connection
//!     → rules probed in registration order
//!     → PrefixedStream queued on the first matching SubListener
//! ```
//!
//! # Design Decisions
//! - Sniffing happens off the accept loop so a slow client cannot stall it
//! - Sniffed bytes are replayed, so protocol servers see the full stream
//! - Rules are fixed once `serve` starts

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};

use crate::net::listener::is_connection_error;
use crate::net::matcher::{MatchOutcome, Matcher};
use crate::net::stream::PrefixedStream;

/// Largest connection preface read while sniffing.
pub const MAX_SNIFF_BYTES: usize = 4096;

/// Default time a client gets to send enough bytes to be classified.
pub const DEFAULT_SNIFF_TIMEOUT: Duration = Duration::from_secs(5);

/// Connections queued per sub-listener before sniff tasks wait.
const SUB_LISTENER_BACKLOG: usize = 128;

/// Error type for multiplexer operations.
#[derive(Debug, Error)]
pub enum MuxError {
    /// Rules cannot change once the accept loop runs.
    #[error("shared listener is already serving")]
    AlreadyServing,
    /// The shared listener or this sub-listener was closed.
    #[error("shared listener is closed")]
    Closed,
    #[error("protocol rule needs at least one matcher")]
    NoMatchers,
    #[error("shared listener I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type Accepted = (PrefixedStream, SocketAddr);

struct Rule {
    matchers: Vec<Box<dyn Matcher>>,
    tx: mpsc::Sender<Accepted>,
}

impl Rule {
    fn probe(&self, preface: &[u8]) -> MatchOutcome {
        let mut outcome = MatchOutcome::Rejected;
        for matcher in &self.matchers {
            match matcher.probe(preface) {
                MatchOutcome::Matched => return MatchOutcome::Matched,
                MatchOutcome::NeedMore => outcome = MatchOutcome::NeedMore,
                MatchOutcome::Rejected => {}
            }
        }
        outcome
    }
}

enum Decision {
    Dispatch(mpsc::Sender<Accepted>),
    Reject,
    NeedMore,
}

struct Shared {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    rules: Mutex<Vec<Rule>>,
    serving: AtomicBool,
    sniff_timeout_ms: AtomicU64,
    closed: watch::Sender<bool>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn sniff_timeout(&self) -> Duration {
        Duration::from_millis(self.sniff_timeout_ms.load(Ordering::Relaxed))
    }

    /// Earlier rules take priority: a rule still waiting for bytes holds
    /// back any later rule that already matches.
    fn decide(&self, preface: &[u8]) -> Decision {
        let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        for rule in rules.iter() {
            match rule.probe(preface) {
                MatchOutcome::Matched => return Decision::Dispatch(rule.tx.clone()),
                MatchOutcome::NeedMore => return Decision::NeedMore,
                MatchOutcome::Rejected => {}
            }
        }
        Decision::Reject
    }

    async fn sniff(
        &self,
        stream: &mut TcpStream,
    ) -> std::io::Result<Option<(mpsc::Sender<Accepted>, Bytes)>> {
        let mut buf = vec![0u8; MAX_SNIFF_BYTES];
        let mut filled = 0;
        loop {
            match self.decide(&buf[..filled]) {
                Decision::Dispatch(tx) => {
                    buf.truncate(filled);
                    return Ok(Some((tx, Bytes::from(buf))));
                }
                Decision::Reject => return Ok(None),
                Decision::NeedMore => {}
            }
            if filled == buf.len() {
                return Ok(None);
            }
            let n = stream.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Ok(None);
            }
            filled += n;
        }
    }

    async fn dispatch(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr) {
        let sniffed = tokio::time::timeout(self.sniff_timeout(), self.sniff(&mut stream)).await;
        let (tx, preface) = match sniffed {
            Ok(Ok(Some(found))) => found,
            Ok(Ok(None)) => {
                tracing::debug!(peer_addr = %peer, "No protocol matched, dropping connection");
                return;
            }
            Ok(Err(e)) => {
                tracing::debug!(peer_addr = %peer, error = %e, "Connection failed while sniffing");
                return;
            }
            Err(_) => {
                tracing::debug!(peer_addr = %peer, "Protocol sniff timed out");
                return;
            }
        };

        if tx.send((PrefixedStream::new(preface, stream), peer)).await.is_err() {
            tracing::debug!(peer_addr = %peer, "Sub-listener closed, dropping connection");
        }
    }
}

/// A TCP listener shared by several protocol servers.
///
/// Each server claims a [`SubListener`] with [`match_protocol`] before
/// whoever owns the listener calls [`serve`].
///
/// [`match_protocol`]: SharedListener::match_protocol
/// [`serve`]: SharedListener::serve
#[derive(Clone)]
pub struct SharedListener {
    inner: Arc<Shared>,
}

impl SharedListener {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, MuxError> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener)
    }

    pub fn from_listener(listener: TcpListener) -> Result<Self, MuxError> {
        let local_addr = listener.local_addr()?;
        let (closed, _) = watch::channel(false);
        tracing::info!(address = %local_addr, "Shared listener bound");
        Ok(Self {
            inner: Arc::new(Shared {
                local_addr,
                listener: Mutex::new(Some(listener)),
                rules: Mutex::new(Vec::new()),
                serving: AtomicBool::new(false),
                sniff_timeout_ms: AtomicU64::new(DEFAULT_SNIFF_TIMEOUT.as_millis() as u64),
                closed,
            }),
        })
    }

    /// Time a connection may take to send a recognizable preface.
    pub fn with_sniff_timeout(self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        self.inner.sniff_timeout_ms.store(millis, Ordering::Relaxed);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Register a protocol rule. Connections whose preface satisfies any of
    /// `matchers` go to the returned sub-listener, unless an earlier rule
    /// claims them first.
    pub fn match_protocol(
        &self,
        matchers: Vec<Box<dyn Matcher>>,
    ) -> Result<SubListener, MuxError> {
        if matchers.is_empty() {
            return Err(MuxError::NoMatchers);
        }
        if self.inner.is_closed() {
            return Err(MuxError::Closed);
        }
        let mut rules = self.inner.rules.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.serving.load(Ordering::SeqCst) {
            return Err(MuxError::AlreadyServing);
        }

        let (tx, rx) = mpsc::channel(SUB_LISTENER_BACKLOG);
        tracing::debug!(
            address = %self.inner.local_addr,
            matchers = ?matchers,
            "Protocol rule registered"
        );
        rules.push(Rule { matchers, tx });
        Ok(SubListener {
            rx,
            local_addr: self.inner.local_addr,
        })
    }

    /// Register a rule with a single matcher.
    pub fn match_with(&self, matcher: impl Matcher + 'static) -> Result<SubListener, MuxError> {
        self.match_protocol(vec![Box::new(matcher)])
    }

    /// Run the root accept loop until [`close`](SharedListener::close).
    pub async fn serve(&self) -> Result<(), MuxError> {
        let listener = {
            let _rules = self.inner.rules.lock().unwrap_or_else(PoisonError::into_inner);
            if self.inner.serving.swap(true, Ordering::SeqCst) {
                return Err(MuxError::AlreadyServing);
            }
            self.inner
                .listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        };
        let Some(listener) = listener else {
            return Err(MuxError::Closed);
        };

        let mut closed = self.inner.closed.subscribe();
        tracing::info!(address = %self.inner.local_addr, "Shared listener serving");

        loop {
            tokio::select! {
                _ = wait_closed(&mut closed) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(Arc::clone(&self.inner).dispatch(stream, peer));
                    }
                    Err(e) if is_connection_error(&e) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Shared listener accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        tracing::info!(address = %self.inner.local_addr, "Shared listener stopped");
        Ok(())
    }

    /// Stop accepting and close every sub-listener.
    pub fn close(&self) {
        self.inner.closed.send_replace(true);
        self.inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // Dropping the senders ends every SubListener::accept.
        self.inner
            .rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl std::fmt::Debug for SharedListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedListener")
            .field("local_addr", &self.inner.local_addr)
            .field("serving", &self.inner.serving.load(Ordering::Relaxed))
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

/// The connections one protocol rule claimed.
#[derive(Debug)]
pub struct SubListener {
    rx: mpsc::Receiver<Accepted>,
    local_addr: SocketAddr,
}

impl SubListener {
    /// Next matched connection; its stream replays the sniffed preface.
    pub async fn accept(&mut self) -> Result<Accepted, MuxError> {
        self.rx.recv().await.ok_or(MuxError::Closed)
    }

    /// Stop receiving. Connections matched afterwards are dropped.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Address of the shared root listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
