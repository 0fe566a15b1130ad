//! Per-call cancellation and deadline.
//!
//! A [`CallContext`] travels with each [`send`](crate::Batcher::send)
//! call and carries an optional monotonic deadline plus a cancel flag.
//! Cancellation is cooperative and caller-scoped: canceling a context
//! abandons that caller's wait without disturbing other submissions
//! sharing the same batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::BatchError;

/// Cancellation and deadline for one [`send`](crate::Batcher::send)
/// call.
///
/// Cloning a context shares its cancel flag: canceling through any
/// [`CancelHandle`] is observed by every clone. A default context has no
/// deadline and is never canceled.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

/// Cancels the [`CallContext`] it was obtained from. Cloneable and
/// cheap; safe to trigger from any task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel the originating context. Idempotent.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

impl CallContext {
    /// A context with no deadline that is never canceled unless a
    /// [`CancelHandle`] says so.
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            deadline: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        let mut ctx = Self::new();
        ctx.deadline = Some(deadline);
        ctx
    }

    /// A handle that cancels this context (and all of its clones).
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel_tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// The absolute deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once a [`CancelHandle`] fired.
    pub fn is_canceled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// True once the context is canceled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.is_canceled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves when the context is canceled or its deadline passes.
    /// Pends forever on a context with neither.
    pub async fn done(&self) {
        let mut cancel_rx = self.cancel_rx.clone();
        let canceled = async move {
            // The sender lives inside `self`, so `changed` cannot fail
            // while this future is polled; pend if it somehow does.
            if cancel_rx.wait_for(|canceled| *canceled).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = canceled => {}
                }
            }
            None => canceled.await,
        }
    }

    /// The error a done context maps to: cancellation wins over the
    /// deadline when both apply.
    pub(crate) fn error<E>(&self) -> BatchError<E> {
        if self.is_canceled() {
            BatchError::Canceled
        } else {
            BatchError::DeadlineExceeded
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_context_is_not_done() {
        let ctx = CallContext::new();
        assert!(!ctx.is_done());
        assert!(!ctx.is_canceled());
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test]
    async fn cancel_is_observed_by_clones() {
        let ctx = CallContext::new();
        let clone = ctx.clone();
        ctx.cancel_handle().cancel();
        assert!(ctx.is_canceled());
        assert!(clone.is_canceled());
        // Resolves immediately.
        clone.done().await;
        assert!(matches!(ctx.error::<String>(), BatchError::Canceled));
    }

    #[tokio::test]
    async fn deadline_expires() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        assert!(!ctx.is_done());
        ctx.done().await;
        assert!(ctx.is_done());
        assert!(!ctx.is_canceled());
        assert!(matches!(ctx.error::<String>(), BatchError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn cancel_races_ahead_of_a_far_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_secs(60));
        let handle = ctx.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.cancel();
        });
        tokio::time::timeout(Duration::from_secs(1), ctx.done())
            .await
            .expect("cancel should resolve done() long before the deadline");
        assert!(ctx.is_canceled());
    }
}
