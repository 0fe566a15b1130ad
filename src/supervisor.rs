//! Process-lifetime supervision.
//!
//! A [`Supervisor`] owns the shutdown signal for everything the batcher
//! spawns. Long-running work registers through
//! [`spawn_task`](Supervisor::spawn_task), which refuses new work once
//! shutdown has begun; [`join`](Supervisor::join) waits for the
//! registered work to finish during process teardown.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, info_span, Instrument};

/// Returned by supervised operations once shutdown has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("supervisor has shut down")]
pub struct Unavailable;

/// Cloneable handle to one supervised lifetime.
///
/// All clones share the same shutdown state; signaling
/// [`shutdown`](Supervisor::shutdown) through any clone is observed by
/// every task and every [`quiesced`](Supervisor::quiesced) waiter.
#[derive(Debug, Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    quiesce: watch::Sender<bool>,
    active: watch::Sender<usize>,
}

/// Decrements the supervised-task count when the task finishes, panic
/// included.
struct TaskGuard {
    inner: Arc<Inner>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.inner.active.send_modify(|n| *n -= 1);
    }
}

impl Supervisor {
    /// A fresh supervisor, accepting work.
    pub fn new() -> Self {
        let (quiesce, _) = watch::channel(false);
        let (active, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(Inner { quiesce, active }),
        }
    }

    /// True once [`shutdown`](Supervisor::shutdown) has been signaled.
    pub fn is_quiescing(&self) -> bool {
        *self.inner.quiesce.borrow()
    }

    /// Resolves once shutdown is signaled. Usable from any number of
    /// waiters, including inside `select!` loops.
    pub async fn quiesced(&self) {
        let mut rx = self.inner.quiesce.subscribe();
        let _ = rx.wait_for(|quiescing| *quiescing).await;
    }

    /// Spawn a named task whose lifetime this supervisor tracks.
    ///
    /// Refused with [`Unavailable`] once shutdown has begun. The name
    /// labels the task's tracing span.
    pub fn spawn_task<F>(&self, name: &'static str, fut: F) -> Result<(), Unavailable>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_quiescing() {
            return Err(Unavailable);
        }
        self.inner.active.send_modify(|n| *n += 1);
        let guard = TaskGuard {
            inner: Arc::clone(&self.inner),
        };
        let span = info_span!("supervised_task", name);
        tokio::spawn(
            async move {
                let _guard = guard;
                fut.await;
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Signal shutdown. Idempotent; does not wait for tasks.
    pub fn shutdown(&self) {
        let was_quiescing = self.inner.quiesce.send_replace(true);
        if !was_quiescing {
            info!("supervisor: shutdown requested");
        }
    }

    /// Wait until every supervised task has finished.
    pub async fn join(&self) {
        let mut rx = self.inner.active.subscribe();
        let _ = rx.wait_for(|active| *active == 0).await;
    }

    /// Signal shutdown and wait for all supervised tasks to finish.
    pub async fn stop(&self) {
        self.shutdown();
        self.join().await;
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn spawns_until_shutdown() {
        let supervisor = Supervisor::new();
        assert!(!supervisor.is_quiescing());
        assert!(supervisor.spawn_task("noop", async {}).is_ok());

        supervisor.shutdown();
        assert!(supervisor.is_quiescing());
        assert_eq!(supervisor.spawn_task("late", async {}), Err(Unavailable));
    }

    #[tokio::test]
    async fn quiesced_resolves_for_every_waiter() {
        let supervisor = Supervisor::new();
        let a = supervisor.clone();
        let b = supervisor.clone();
        let waiters = tokio::spawn(async move {
            tokio::join!(a.quiesced(), b.quiesced());
        });
        supervisor.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiters)
            .await
            .expect("quiesced waiters should resolve after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn join_waits_for_running_tasks() {
        let supervisor = Supervisor::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        supervisor
            .spawn_task("blocked", async move {
                let _ = release_rx.await;
            })
            .unwrap();

        let joiner = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.stop().await })
        };
        // The join must still be pending while the task is blocked.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!joiner.is_finished());

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), joiner)
            .await
            .expect("join should resolve once tasks finish")
            .unwrap();
    }

    #[tokio::test]
    async fn join_with_no_tasks_is_immediate() {
        let supervisor = Supervisor::new();
        tokio::time::timeout(Duration::from_millis(100), supervisor.join())
            .await
            .expect("nothing to wait for");
    }
}
