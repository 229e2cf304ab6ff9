//! Shutdown coordination for a server instance.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Coordinator for graceful shutdown.
///
/// Carries the drain deadline to every subscriber. The first trigger wins;
/// later triggers return the deadline already set.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<Option<Instant>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Start shutting down; connections have `grace` to finish.
    pub fn trigger(&self, grace: Duration) -> Instant {
        let requested = Instant::now() + grace;
        let mut deadline = requested;
        self.tx.send_if_modified(|current| match current {
            Some(existing) => {
                deadline = *existing;
                false
            }
            None => {
                *current = Some(requested);
                true
            }
        });
        deadline
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.tx.borrow()
    }

    pub fn is_triggered(&self) -> bool {
        self.deadline().is_some()
    }

    pub fn subscribe(&self) -> ShutdownWatch {
        ShutdownWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`ShutdownSignal`].
#[derive(Debug, Clone)]
pub struct ShutdownWatch {
    rx: watch::Receiver<Option<Instant>>,
}

impl ShutdownWatch {
    /// Resolve with the deadline once shutdown is triggered. A dropped
    /// signal counts as an immediate shutdown.
    pub async fn triggered(&mut self) -> Instant {
        loop {
            if let Some(deadline) = *self.rx.borrow_and_update() {
                return deadline;
            }
            if self.rx.changed().await.is_err() {
                return Instant::now();
            }
        }
    }
}
