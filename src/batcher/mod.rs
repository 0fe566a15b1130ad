//! The request batcher.
//!
//! Coalesces independently submitted unary requests, each targeting a
//! logical destination, into fewer multi-request batches for a
//! downstream [`Sender`](crate::Sender). Batching amortizes the
//! transport's fixed per-call overhead; the configured size and time
//! triggers bound the added latency.

mod core;
mod heap;
mod pending;
mod stats;

pub use stats::BatcherStats;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::debug;

use crate::batcher::core::{CoreLoop, Ingest};
use crate::batcher::pending::Submission;
use crate::batcher::stats::StatsInner;
use crate::config::Config;
use crate::context::CallContext;
use crate::error::BatchError;
use crate::sender::Sender;
use crate::supervisor::Supervisor;

/// Handle for submitting requests to be batched per destination.
///
/// Cheap to clone; every clone feeds the same core loop. Dropping all
/// handles lets the loop exit once in-flight work completes.
pub struct Batcher<S: Sender> {
    ingest_tx: mpsc::Sender<Ingest<S>>,
    supervisor: Supervisor,
    stats: Arc<StatsInner>,
}

impl<S: Sender> Clone for Batcher<S> {
    fn clone(&self) -> Self {
        Self {
            ingest_tx: self.ingest_tx.clone(),
            supervisor: self.supervisor.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S: Sender> Batcher<S> {
    /// Construct a batcher and start its core loop under the
    /// configured supervisor.
    ///
    /// # Panics
    ///
    /// Panics when `config.sender` or `config.supervisor` is absent.
    /// Both are required collaborators; running without either is a
    /// programming error that must surface at construction, not at the
    /// first send.
    pub fn new(config: Config<S>) -> Self {
        let sender = config
            .sender
            .clone()
            .expect("request-batcher Config: sender is required");
        let supervisor = config
            .supervisor
            .clone()
            .expect("request-batcher Config: supervisor is required");

        let limits = config.limits();
        limits.warn_if_unflushable();

        let depth = config.submission_queue_depth.max(1);
        let (ingest_tx, ingest_rx) = mpsc::channel(depth);
        let dispatch_slots = (config.in_flight_backpressure > 0)
            .then(|| Arc::new(Semaphore::new(config.in_flight_backpressure)));
        let stats = Arc::new(StatsInner::default());

        let core = CoreLoop::new(
            sender,
            supervisor.clone(),
            limits,
            ingest_rx,
            dispatch_slots,
            Arc::clone(&stats),
        );
        if supervisor.spawn_task("batcher-core", core.run()).is_err() {
            // The supervisor was already shut down; every send on this
            // batcher will observe `Unavailable`.
            debug!("batcher constructed after supervisor shutdown");
        }

        Self {
            ingest_tx,
            supervisor,
            stats,
        }
    }

    /// Submit one request for `destination` and wait for its result.
    ///
    /// The caller observes exactly one of:
    /// - the positional sub-response from the batch that carried this
    ///   request,
    /// - the downstream error (or
    ///   [`BadBatchResponse`](BatchError::BadBatchResponse)) that failed
    ///   that batch,
    /// - [`Canceled`](BatchError::Canceled) /
    ///   [`DeadlineExceeded`](BatchError::DeadlineExceeded) from its own
    ///   `ctx`,
    /// - [`Unavailable`](BatchError::Unavailable) when the supervisor
    ///   shuts down first.
    ///
    /// A context that fires after the submission was accepted abandons
    /// only this caller's wait: the request stays in its batch and the
    /// eventual reply is discarded, so sibling submissions are
    /// unaffected.
    pub async fn send(
        &self,
        ctx: &CallContext,
        destination: S::Destination,
        request: S::Request,
    ) -> Result<S::Response, BatchError<S::Error>> {
        if ctx.is_done() {
            return Err(ctx.error());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let submission = Submission {
            request,
            reply: reply_tx,
        };

        tokio::select! {
            sent = self.ingest_tx.send((destination, submission)) => {
                if sent.is_err() {
                    // Core loop gone: the supervisor shut it down.
                    return Err(BatchError::Unavailable);
                }
            }
            _ = self.supervisor.quiesced() => return Err(BatchError::Unavailable),
            _ = ctx.done() => return Err(ctx.error()),
        }

        tokio::select! {
            reply = reply_rx => match reply {
                Ok(result) => result,
                // The reply channel only drops without a value when the
                // batcher shut down before this submission dispatched.
                Err(_) => Err(BatchError::Unavailable),
            },
            _ = self.supervisor.quiesced() => Err(BatchError::Unavailable),
            _ = ctx.done() => Err(ctx.error()),
        }
    }

    /// A point-in-time snapshot of batcher activity.
    pub fn stats(&self) -> BatcherStats {
        self.stats.snapshot()
    }
}
