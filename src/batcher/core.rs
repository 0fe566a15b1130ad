//! The single-owner event loop.
//!
//! Exactly one task runs [`CoreLoop::run`]. It is the sole owner of the
//! pending-batch map, the deadline heap, and the master timer, so the
//! hot path needs no locks; producers and dispatch workers reach it only
//! through channels.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::batcher::heap::DeadlineHeap;
use crate::batcher::pending::{PendingBatch, Submission};
use crate::batcher::stats::StatsInner;
use crate::config::Limits;
use crate::error::BatchError;
use crate::sender::Sender;
use crate::supervisor::Supervisor;

/// Why a pending batch left the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    /// The destination reached `max_msgs_per_batch`.
    Size,
    /// The batch's `max_wait`/`max_idle` deadline fired.
    Deadline,
}

/// What producers put on the ingest channel.
pub(crate) type Ingest<S> = (<S as Sender>::Destination, Submission<S>);

pub(crate) struct CoreLoop<S: Sender> {
    sender: Arc<S>,
    supervisor: Supervisor,
    limits: Limits,
    ingest_rx: mpsc::Receiver<Ingest<S>>,
    completion_tx: mpsc::UnboundedSender<()>,
    completion_rx: mpsc::UnboundedReceiver<()>,
    /// Present iff `in_flight_backpressure > 0`.
    dispatch_slots: Option<Arc<Semaphore>>,
    pending: HashMap<S::Destination, PendingBatch<S>>,
    heap: DeadlineHeap<S::Destination>,
    in_flight: usize,
    stats: Arc<StatsInner>,
}

impl<S: Sender> CoreLoop<S> {
    pub fn new(
        sender: Arc<S>,
        supervisor: Supervisor,
        limits: Limits,
        ingest_rx: mpsc::Receiver<Ingest<S>>,
        dispatch_slots: Option<Arc<Semaphore>>,
        stats: Arc<StatsInner>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            sender,
            supervisor,
            limits,
            ingest_rx,
            completion_tx,
            completion_rx,
            dispatch_slots,
            pending: HashMap::new(),
            heap: DeadlineHeap::new(),
            in_flight: 0,
            stats,
        }
    }

    pub async fn run(mut self) {
        // One master timer, re-armed to the heap minimum after every
        // mutation. `timer_armed` gates the branch so a drained heap
        // never leaves a stale sleep pollable.
        let sleep = time::sleep_until(Instant::now());
        tokio::pin!(sleep);
        let mut timer_armed = false;

        loop {
            tokio::select! {
                biased;

                _ = self.supervisor.quiesced() => {
                    self.drain("shutdown").await;
                    return;
                }

                Some(()) = self.completion_rx.recv() => {
                    self.in_flight -= 1;
                    self.stats.record_completion();
                }

                ingest = self.ingest_rx.recv() => match ingest {
                    Some((destination, submission)) => {
                        self.on_ingest(destination, submission).await;
                    }
                    None => {
                        // Every batcher handle dropped; nobody is left
                        // to wait on pending replies.
                        self.drain("all handles dropped").await;
                        return;
                    }
                },

                _ = sleep.as_mut(), if timer_armed => {
                    // The timer may fire late or spuriously relative to
                    // heap mutations; the handler trusts only `now`.
                    self.on_deadline(Instant::now()).await;
                }
            }

            timer_armed = match self.heap.peek_deadline() {
                Some(deadline) => {
                    sleep.as_mut().reset(deadline);
                    true
                }
                None => false,
            };
        }
    }

    async fn on_ingest(&mut self, destination: S::Destination, submission: Submission<S>) {
        let now = Instant::now();
        self.stats.record_accepted();
        let batch = self
            .pending
            .entry(destination.clone())
            .or_insert_with(|| PendingBatch::new(destination.clone(), now));
        batch.push(submission, now);
        let queued = batch.len();
        let deadline = batch.deadline(&self.limits);
        trace!(destination = ?destination, queued, "submission queued");

        if self.limits.size_trigger(queued) {
            self.heap.remove(&destination);
            if let Some(batch) = self.pending.remove(&destination) {
                self.dispatch(batch, FlushReason::Size).await;
            }
        } else if let Some(deadline) = deadline {
            self.heap.update(destination, deadline);
        }
    }

    async fn on_deadline(&mut self, now: Instant) {
        while let Some(destination) = self.heap.pop_due(now) {
            if let Some(batch) = self.pending.remove(&destination) {
                self.dispatch(batch, FlushReason::Deadline).await;
            }
        }
    }

    /// Hand a pending batch to a dispatch worker. When backpressure is
    /// configured and saturated, this suspends until a slot frees up;
    /// it is the only place the loop blocks outside its select.
    async fn dispatch(&mut self, batch: PendingBatch<S>, reason: FlushReason) {
        let permit = match &self.dispatch_slots {
            Some(slots) => Arc::clone(slots).acquire_owned().await.ok(),
            None => None,
        };

        let (request, replies) = batch.into_dispatch();
        let size = request.len();
        let destination = request.destination.clone();

        let sender = Arc::clone(&self.sender);
        let completion_tx = self.completion_tx.clone();
        let stats = Arc::clone(&self.stats);
        let worker = async move {
            let expected = replies.len();
            match sender.send(request).await {
                Ok(response) if response.len() == expected => {
                    for (reply, sub_response) in
                        replies.into_iter().zip(response.responses)
                    {
                        let _ = reply.send(Ok(sub_response));
                    }
                }
                Ok(response) => {
                    let actual = response.len();
                    warn!(expected, actual, "batch response arity mismatch");
                    stats.record_failed_batch();
                    for reply in replies {
                        let _ = reply.send(Err(BatchError::BadBatchResponse {
                            expected,
                            actual,
                        }));
                    }
                }
                Err(err) => {
                    debug!(error = %err, "downstream send failed");
                    stats.record_failed_batch();
                    for reply in replies {
                        let _ = reply.send(Err(BatchError::Downstream(err.clone())));
                    }
                }
            }
            drop(permit);
            let _ = completion_tx.send(());
        };

        match self.supervisor.spawn_task("batcher-dispatch", worker) {
            Ok(()) => {
                self.in_flight += 1;
                self.stats.record_dispatch(size);
                debug!(
                    destination = ?destination,
                    size,
                    reason = ?reason,
                    in_flight = self.in_flight,
                    "dispatched batch"
                );
            }
            Err(_) => {
                // Shutdown raced the dispatch. The dropped worker takes
                // the reply channels with it, which the callers observe
                // as `Unavailable`.
                debug!(destination = ?destination, size, "dispatch refused by shutdown");
            }
        }
    }

    /// Terminal path. Fails everything accepted but not yet dispatched
    /// with `Unavailable`, then lets in-flight workers run to completion
    /// so their callers still get real replies.
    async fn drain(&mut self, cause: &str) {
        self.ingest_rx.close();
        let mut undispatched = 0usize;
        while let Some((_, submission)) = self.ingest_rx.recv().await {
            undispatched += 1;
            let _ = submission.reply.send(Err(BatchError::Unavailable));
        }
        for (_, batch) in self.pending.drain() {
            for reply in batch.into_replies() {
                undispatched += 1;
                let _ = reply.send(Err(BatchError::Unavailable));
            }
        }
        self.heap.clear();

        info!(cause, undispatched, in_flight = self.in_flight, "batcher draining");
        while self.in_flight > 0 {
            match self.completion_rx.recv().await {
                Some(()) => {
                    self.in_flight -= 1;
                    self.stats.record_completion();
                }
                None => break,
            }
        }
        info!("batcher drained");
    }
}
