//! Connection limiting and lifecycle tracking.
//!
//! # Responsibilities
//! - Bound the number of concurrently served connections
//! - Generate unique connection IDs for tracing
//! - Count live connections so shutdown can report what it abandoned

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Relaxed ordering is enough: IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out connection slots and counts the live ones.
///
/// A slot is taken before a connection is accepted, so a full server
/// stops pulling connections off the listener instead of queueing tasks.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    limit: Arc<Semaphore>,
    max_connections: usize,
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new(max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            active_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait for a free slot. Returns `None` once the tracker is closed.
    pub async fn reserve(&self) -> Option<ConnectionSlot> {
        let permit = Arc::clone(&self.limit).acquire_owned().await.ok()?;
        Some(ConnectionSlot { permit })
    }

    /// Stop handing out slots; pending and future `reserve` calls return `None`.
    pub fn close(&self) {
        self.limit.close();
    }

    /// Record an accepted connection. The guard decrements on drop.
    pub fn track(&self, slot: ConnectionSlot) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
            _permit: slot.permit,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    pub fn available_slots(&self) -> usize {
        self.limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A reserved connection slot, released on drop unless tracked.
#[derive(Debug)]
pub struct ConnectionSlot {
    permit: OwnedSemaphorePermit,
}

/// Tracks one connection's lifetime. Holds its slot until dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
