//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Server states (mod.rs):
//!     Constructed → Serving → ShuttingDown → Stopped
//!     Constructed → Stopped            (shutdown before serve)
//!
//! Shutdown (shutdown.rs):
//!     trigger(grace) → accept loop stops → connections drain
//!     → deadline passes → remaining connections aborted
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary triggers shutdown
//! ```
//!
//! # Design Decisions
//! - State is published on a watch channel so callers can await `Stopped`
//! - Transitions only move forward

use std::fmt;

use tokio::sync::watch;

pub mod shutdown;
pub mod signals;

pub use shutdown::{ShutdownSignal, ShutdownWatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Constructed,
    Serving,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Serving => "serving",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Stopped => "stopped",
        };
        f.pad(name)
    }
}

/// Forward-only state machine of one server instance.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Constructed);
        Self { tx }
    }

    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Constructed → Serving. On failure returns the state that blocked it.
    pub fn begin_serving(&self) -> Result<(), LifecycleState> {
        let mut blocked = None;
        self.tx.send_if_modified(|state| match *state {
            LifecycleState::Constructed => {
                *state = LifecycleState::Serving;
                true
            }
            other => {
                blocked = Some(other);
                false
            }
        });
        match blocked {
            Some(state) => Err(state),
            None => Ok(()),
        }
    }

    /// Serving → ShuttingDown, or Constructed → Stopped for a server that
    /// never served. Returns the state before the call.
    pub fn begin_shutdown(&self) -> LifecycleState {
        let mut previous = LifecycleState::Constructed;
        self.tx.send_if_modified(|state| {
            previous = *state;
            let next = match *state {
                LifecycleState::Constructed => LifecycleState::Stopped,
                LifecycleState::Serving => LifecycleState::ShuttingDown,
                other => other,
            };
            let changed = next != *state;
            *state = next;
            changed
        });
        previous
    }

    pub fn mark_stopped(&self) {
        self.tx.send_if_modified(|state| {
            let changed = *state != LifecycleState::Stopped;
            *state = LifecycleState::Stopped;
            changed
        });
    }

    pub async fn wait_stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|state| *state == LifecycleState::Stopped).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
