//! Error types for the request batcher.
//!
//! A single `thiserror` enum covers every failure a caller can observe.
//! It is generic over the downstream sender's error type, so transport
//! failures reach callers verbatim instead of stringified.

use thiserror::Error;

/// Errors surfaced by [`Batcher::send`](crate::Batcher::send).
///
/// `E` is the [`Sender::Error`](crate::Sender::Error) type of the
/// downstream transport. When a dispatched batch fails, every submission
/// in it receives its own clone of the same downstream error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError<E> {
    /// The supervisor has shut down. Terminal for this batcher: no
    /// further submissions will be accepted, and queued-but-undispatched
    /// submissions are failed with this error during drain.
    #[error("batcher unavailable: supervisor has shut down")]
    Unavailable,

    /// The caller's [`CallContext`](crate::CallContext) was canceled.
    /// Terminal for that call only; sibling submissions in the same
    /// batch are unaffected.
    #[error("call canceled")]
    Canceled,

    /// The caller's [`CallContext`](crate::CallContext) deadline passed
    /// before a reply arrived. Terminal for that call only.
    #[error("call deadline exceeded")]
    DeadlineExceeded,

    /// The downstream sender returned an error for the whole batch. The
    /// error is delivered as-is to every submission in the batch.
    #[error("downstream send failed: {0}")]
    Downstream(E),

    /// The downstream sender broke its positional contract: the composed
    /// response did not contain exactly one sub-response per sub-request.
    #[error("bad batch response: expected {expected} sub-responses, got {actual}")]
    BadBatchResponse {
        /// Sub-requests in the dispatched batch.
        expected: usize,
        /// Sub-responses the sender actually returned.
        actual: usize,
    },
}

impl<E> BatchError<E> {
    /// True when the batcher itself refused the call because its
    /// supervisor shut down.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// The downstream sender's error, if that is what failed this call.
    pub fn downstream(&self) -> Option<&E> {
        match self {
            Self::Downstream(err) => Some(err),
            _ => None,
        }
    }
}
