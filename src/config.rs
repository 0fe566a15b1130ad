//! Batcher configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::sender::Sender;
use crate::supervisor::Supervisor;

/// Default capacity of the bounded submission channel between callers
/// and the core loop.
pub const DEFAULT_SUBMISSION_QUEUE_DEPTH: usize = 64;

/// Configuration for [`Batcher::new`](crate::Batcher::new).
///
/// `sender` and `supervisor` are required; construction panics when
/// either is missing. The flush triggers are all optional individually,
/// but at least one of `max_msgs_per_batch`, `max_wait`, or `max_idle`
/// must be enabled or nothing will ever flush — a misconfiguration this
/// type warns about rather than rejects.
pub struct Config<S: Sender> {
    /// Downstream transport. Required.
    pub sender: Option<Arc<S>>,
    /// Shutdown source and task spawner. Required.
    pub supervisor: Option<Supervisor>,
    /// Dispatch a destination's batch as soon as it holds this many
    /// sub-requests. `0` disables the size trigger.
    pub max_msgs_per_batch: usize,
    /// Dispatch a batch at most this long after its first submission.
    /// `None` (or a zero duration) disables the trigger.
    pub max_wait: Option<Duration>,
    /// Dispatch a batch once this long has passed since its most recent
    /// submission. `None` (or a zero duration) disables the trigger.
    pub max_idle: Option<Duration>,
    /// Upper bound on concurrently dispatched batches. While saturated,
    /// the core loop stalls at dispatch, which in turn stalls ingest.
    /// `0` means unbounded.
    pub in_flight_backpressure: usize,
    /// Capacity of the bounded submission channel.
    pub submission_queue_depth: usize,
}

impl<S: Sender> Default for Config<S> {
    fn default() -> Self {
        Self {
            sender: None,
            supervisor: None,
            max_msgs_per_batch: 0,
            max_wait: None,
            max_idle: None,
            in_flight_backpressure: 0,
            submission_queue_depth: DEFAULT_SUBMISSION_QUEUE_DEPTH,
        }
    }
}

impl<S: Sender> Config<S> {
    /// An empty configuration; fill in at least `sender` and
    /// `supervisor` before constructing a batcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the downstream transport.
    pub fn with_sender(mut self, sender: Arc<S>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Set the supervisor.
    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Set the size trigger.
    pub fn with_max_msgs_per_batch(mut self, max: usize) -> Self {
        self.max_msgs_per_batch = max;
        self
    }

    /// Set the maximum time a batch may wait after its first submission.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Set the maximum time a batch may sit idle after its most recent
    /// submission.
    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Bound the number of concurrently dispatched batches.
    pub fn with_in_flight_backpressure(mut self, max_in_flight: usize) -> Self {
        self.in_flight_backpressure = max_in_flight;
        self
    }

    /// Set the submission channel capacity.
    pub fn with_submission_queue_depth(mut self, depth: usize) -> Self {
        self.submission_queue_depth = depth;
        self
    }

    /// Normalized flush triggers (zero durations become disabled).
    pub(crate) fn limits(&self) -> Limits {
        Limits {
            max_msgs_per_batch: self.max_msgs_per_batch,
            max_wait: self.max_wait.filter(|d| !d.is_zero()),
            max_idle: self.max_idle.filter(|d| !d.is_zero()),
        }
    }
}

/// The normalized flush triggers the core loop evaluates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub max_msgs_per_batch: usize,
    pub max_wait: Option<Duration>,
    pub max_idle: Option<Duration>,
}

impl Limits {
    /// True when a batch holding `queued` sub-requests must be
    /// dispatched immediately.
    pub fn size_trigger(&self, queued: usize) -> bool {
        self.max_msgs_per_batch > 0 && queued >= self.max_msgs_per_batch
    }

    /// Warn when no trigger is enabled: submissions would accumulate
    /// forever and only ever fail on shutdown.
    pub fn warn_if_unflushable(&self) {
        if self.max_msgs_per_batch == 0 && self.max_wait.is_none() && self.max_idle.is_none() {
            warn!(
                "no flush trigger configured (max_msgs_per_batch, max_wait, max_idle all \
                 disabled); submissions will never be dispatched"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::{BatchRequest, BatchResponse};
    use async_trait::async_trait;

    struct NullSender;

    #[async_trait]
    impl Sender for NullSender {
        type Destination = u64;
        type Request = u64;
        type Response = u64;
        type Error = String;

        async fn send(
            &self,
            batch: BatchRequest<u64, u64>,
        ) -> Result<BatchResponse<u64>, String> {
            Ok(BatchResponse::new(batch.requests))
        }
    }

    #[test]
    fn builders_fill_fields() {
        let config = Config::<NullSender>::new()
            .with_max_msgs_per_batch(8)
            .with_max_wait(Duration::from_millis(10))
            .with_max_idle(Duration::from_millis(5))
            .with_in_flight_backpressure(2)
            .with_submission_queue_depth(16);
        assert_eq!(config.max_msgs_per_batch, 8);
        assert_eq!(config.max_wait, Some(Duration::from_millis(10)));
        assert_eq!(config.max_idle, Some(Duration::from_millis(5)));
        assert_eq!(config.in_flight_backpressure, 2);
        assert_eq!(config.submission_queue_depth, 16);
    }

    #[test]
    fn zero_durations_normalize_to_disabled() {
        let limits = Config::<NullSender>::new()
            .with_max_wait(Duration::ZERO)
            .with_max_idle(Duration::ZERO)
            .limits();
        assert!(limits.max_wait.is_none());
        assert!(limits.max_idle.is_none());
    }

    #[test]
    fn size_trigger_threshold() {
        let limits = Config::<NullSender>::new().with_max_msgs_per_batch(3).limits();
        assert!(!limits.size_trigger(2));
        assert!(limits.size_trigger(3));
        assert!(limits.size_trigger(4));

        let disabled = Config::<NullSender>::new().limits();
        assert!(!disabled.size_trigger(usize::MAX));
    }
}
