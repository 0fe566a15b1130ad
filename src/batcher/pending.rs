//! Per-destination accumulation.

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::Limits;
use crate::error::BatchError;
use crate::sender::{BatchRequest, Sender};

/// Reply channel owned by one caller; receives exactly one result.
pub(crate) type ReplyTx<S> = oneshot::Sender<
    Result<<S as Sender>::Response, BatchError<<S as Sender>::Error>>,
>;

/// One accepted request plus the channel its result goes back on.
pub(crate) struct Submission<S: Sender> {
    pub request: S::Request,
    pub reply: ReplyTx<S>,
}

/// The accumulator for one destination. Exists iff at least one
/// submission is queued for that destination; consumed on dispatch.
pub(crate) struct PendingBatch<S: Sender> {
    destination: S::Destination,
    submissions: Vec<Submission<S>>,
    /// When the first submission arrived after the batch was last empty.
    started_at: Instant,
    /// When the most recent submission arrived.
    last_updated: Instant,
}

impl<S: Sender> PendingBatch<S> {
    pub fn new(destination: S::Destination, now: Instant) -> Self {
        Self {
            destination,
            submissions: Vec::new(),
            started_at: now,
            last_updated: now,
        }
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn push(&mut self, submission: Submission<S>, now: Instant) {
        if self.submissions.is_empty() {
            self.started_at = now;
        }
        self.submissions.push(submission);
        self.last_updated = now;
    }

    /// The absolute time this batch must flush even if it never fills:
    /// `min(started_at + max_wait, last_updated + max_idle)` over the
    /// enabled limits, `None` when both are disabled.
    pub fn deadline(&self, limits: &Limits) -> Option<Instant> {
        let wait = limits.max_wait.map(|w| self.started_at + w);
        let idle = limits.max_idle.map(|i| self.last_updated + i);
        match (wait, idle) {
            (Some(w), Some(i)) => Some(w.min(i)),
            (Some(w), None) => Some(w),
            (None, Some(i)) => Some(i),
            (None, None) => None,
        }
    }

    /// Split into the composed downstream request and the waiters to
    /// answer, both in submission order.
    pub fn into_dispatch(self) -> (BatchRequest<S::Destination, S::Request>, Vec<ReplyTx<S>>) {
        let mut requests = Vec::with_capacity(self.submissions.len());
        let mut replies = Vec::with_capacity(self.submissions.len());
        for submission in self.submissions {
            requests.push(submission.request);
            replies.push(submission.reply);
        }
        (
            BatchRequest {
                destination: self.destination,
                requests,
            },
            replies,
        )
    }

    /// The waiters alone, for failing a batch that will never dispatch.
    pub fn into_replies(self) -> Vec<ReplyTx<S>> {
        self.submissions
            .into_iter()
            .map(|submission| submission.reply)
            .collect()
    }
}
