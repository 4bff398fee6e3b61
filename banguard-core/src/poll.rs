//! Bounded, cancellable fixed-interval polling.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::clock::Clock;

/// Shared cancellation signal. Cloning yields a handle to the same flag.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { tries: u32, elapsed: Duration },
    Exhausted { tries: u32 },
    Cancelled { tries: u32 },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn tries(&self) -> u32 {
        match *self {
            PollOutcome::Ready { tries, .. }
            | PollOutcome::Exhausted { tries }
            | PollOutcome::Cancelled { tries } => tries,
        }
    }
}

/// Sleep-then-check loop: waits `interval` before each of at most
/// `max_tries` checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub interval: Duration,
    pub max_tries: u32,
}

impl Poller {
    pub const fn new(interval: Duration, max_tries: u32) -> Self {
        Self { interval, max_tries }
    }

    /// Total time the poller may spend sleeping.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_tries
    }

    pub async fn until<C, F, Fut>(&self, clock: &C, cancel: &CancelFlag, mut check: F) -> PollOutcome
    where
        C: Clock,
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let started = clock.now();
        let mut tries = 0;
        while tries < self.max_tries {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled { tries };
            }
            tokio::select! {
                _ = clock.sleep(self.interval) => {}
                _ = cancel.cancelled() => return PollOutcome::Cancelled { tries },
            }
            tries += 1;
            if check().await {
                return PollOutcome::Ready {
                    tries,
                    elapsed: clock.since(started),
                };
            }
            debug!(tries, max_tries = self.max_tries, "Not ready yet");
        }
        PollOutcome::Exhausted { tries }
    }
}

#[cfg(test)]
mod tests;
