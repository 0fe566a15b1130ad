//! The downstream transport seam.
//!
//! The batcher is transport-agnostic: it composes accepted submissions
//! into a [`BatchRequest`] and hands it to a [`Sender`], which performs
//! one downstream call and returns a positionally composed
//! [`BatchResponse`].

use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;

/// A composed downstream request: every queued sub-request for one
/// destination, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest<D, R> {
    /// The destination all sub-requests share.
    pub destination: D,
    /// Sub-requests in the order their submissions were accepted.
    pub requests: Vec<R>,
}

impl<D, R> BatchRequest<D, R> {
    /// Number of sub-requests in the batch.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True when the batch carries no sub-requests. The batcher never
    /// dispatches an empty batch.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// A composed downstream response: one sub-response per sub-request of
/// the originating [`BatchRequest`], in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResponse<P> {
    /// Sub-responses, positionally matching the batch's sub-requests.
    pub responses: Vec<P>,
}

impl<P> BatchResponse<P> {
    /// Compose a response from positional sub-responses.
    pub fn new(responses: Vec<P>) -> Self {
        Self { responses }
    }

    /// Number of sub-responses.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// True when the response carries no sub-responses.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// The downstream transport invoked once per dispatched batch.
///
/// Contract:
/// - a non-error return contains exactly one sub-response per
///   sub-request, in the same order (the batcher verifies the count and
///   fails the whole batch with
///   [`BatchError::BadBatchResponse`](crate::BatchError::BadBatchResponse)
///   on a mismatch);
/// - an error return means no partial success is observable; the same
///   error is delivered to every submission in the batch, which is why
///   [`Sender::Error`] must be `Clone`.
///
/// The batcher adds no retry and no timeout of its own around this call.
#[async_trait]
pub trait Sender: Send + Sync + 'static {
    /// Opaque comparable key identifying a downstream shard, range, or
    /// partition. Batching is per-destination.
    type Destination: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    /// A single request payload.
    type Request: Send + 'static;
    /// A single sub-response.
    type Response: Send + 'static;
    /// The transport's error type, fanned out to every waiter of a
    /// failed batch.
    type Error: Clone + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Perform one downstream call with a composed batch.
    async fn send(
        &self,
        batch: BatchRequest<Self::Destination, Self::Request>,
    ) -> Result<BatchResponse<Self::Response>, Self::Error>;
}
