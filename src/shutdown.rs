//! Cooperative cancellation for waits inside the worker.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::DispatchError;

/// Sending half of a shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Cancel every [`Shutdown`] created from this trigger.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving half: observed by pacing waits and pull-loop backoffs.
///
/// A signal may also carry an absolute deadline (for push invocations with a
/// hard time limit); reaching it counts as cancellation.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Create a linked trigger and signal.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx, deadline: None })
}

impl Shutdown {
    /// A signal that only its deadline (if any) can cancel.
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx, deadline: None }
    }

    /// Also cancel once `deadline` is reached.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Also cancel after `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the signal fires or the deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let signalled = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Trigger dropped without firing
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = signalled => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => signalled.await,
        }
    }

    /// Sleep until `at`, or fail with [`DispatchError::Cancelled`].
    pub async fn sleep_until(&self, at: Instant) -> Result<(), DispatchError> {
        if self.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(DispatchError::Cancelled),
            _ = tokio::time::sleep_until(at) => Ok(()),
        }
    }

    /// Sleep for `duration`, or fail with [`DispatchError::Cancelled`].
    pub async fn sleep(&self, duration: Duration) -> Result<(), DispatchError> {
        self.sleep_until(Instant::now() + duration).await
    }
}
