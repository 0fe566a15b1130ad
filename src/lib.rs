//! # request-batcher
//!
//! A destination-keyed request batcher. Many tasks submit unary
//! requests, each targeting a logical destination (a shard, a range, a
//! partition); the batcher coalesces them into fewer multi-request
//! batches for a downstream transport with fixed per-call overhead.
//!
//! A single core-loop task owns all mutable state and is fed through
//! channels, so the hot path takes no locks. Batches flush when a
//! destination reaches `max_msgs_per_batch`, when a batch has waited
//! `max_wait` since its first submission, or when it has sat idle
//! `max_idle` since its most recent one — whichever comes first.
//! Responses are split positionally and fanned back out to the original
//! callers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use request_batcher::{Batcher, CallContext, Config, Supervisor};
//! # use request_batcher::{BatchRequest, BatchResponse, Sender};
//! # struct MySender;
//! # #[async_trait::async_trait]
//! # impl Sender for MySender {
//! #     type Destination = u64;
//! #     type Request = String;
//! #     type Response = String;
//! #     type Error = String;
//! #     async fn send(
//! #         &self,
//! #         batch: BatchRequest<u64, String>,
//! #     ) -> Result<BatchResponse<String>, String> {
//! #         Ok(BatchResponse::new(batch.requests))
//! #     }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = Supervisor::new();
//! let batcher = Batcher::new(
//!     Config::new()
//!         .with_sender(Arc::new(MySender))
//!         .with_supervisor(supervisor.clone())
//!         .with_max_msgs_per_batch(16)
//!         .with_max_wait(Duration::from_millis(5)),
//! );
//!
//! let response = batcher
//!     .send(&CallContext::new(), 42, "get k1".to_string())
//!     .await?;
//! # let _ = response;
//! supervisor.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! The batcher is an accelerator, not a reliability layer: it adds no
//! retries and no timeout of its own around the downstream call.

pub mod batcher;
pub mod config;
pub mod context;
pub mod error;
pub mod sender;
pub mod supervisor;

// Re-export the main types for convenience
pub use batcher::{Batcher, BatcherStats};
pub use config::Config;
pub use context::{CallContext, CancelHandle};
pub use error::BatchError;
pub use sender::{BatchRequest, BatchResponse, Sender};
pub use supervisor::Supervisor;

/// Result of one [`Batcher::send`] call against sender `S`.
pub type SendResult<S> =
    std::result::Result<<S as Sender>::Response, BatchError<<S as Sender>::Error>>;
