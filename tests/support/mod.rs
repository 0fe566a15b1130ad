//! Shared test harness: a channel-backed [`Sender`] that forwards every
//! composed batch to the test body, which scripts the response.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use request_batcher::{BatchRequest, BatchResponse, Sender};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FakeError(pub String);

/// One downstream call as observed by the test.
pub struct BatchCall {
    pub batch: BatchRequest<u64, String>,
    respond: oneshot::Sender<Result<BatchResponse<String>, FakeError>>,
}

impl BatchCall {
    /// Answer positionally: each request `r` gets `"{r}/done"`.
    pub fn respond_ok(self) {
        let responses = self
            .batch
            .requests
            .iter()
            .map(|request| format!("{request}/done"))
            .collect();
        let _ = self.respond.send(Ok(BatchResponse::new(responses)));
    }

    pub fn respond_err(self, message: &str) {
        let _ = self.respond.send(Err(FakeError(message.to_string())));
    }

    /// Break the positional contract on purpose.
    pub fn respond_with_arity(self, count: usize) {
        let responses = (0..count).map(|i| format!("bogus-{i}")).collect();
        let _ = self.respond.send(Ok(BatchResponse::new(responses)));
    }
}

/// Hands each composed batch to the test over a channel and waits for
/// the scripted response.
pub struct ChanSender {
    calls: mpsc::UnboundedSender<BatchCall>,
}

#[async_trait]
impl Sender for ChanSender {
    type Destination = u64;
    type Request = String;
    type Response = String;
    type Error = FakeError;

    async fn send(
        &self,
        batch: BatchRequest<u64, String>,
    ) -> Result<BatchResponse<String>, FakeError> {
        let (respond, result) = oneshot::channel();
        self.calls
            .send(BatchCall { batch, respond })
            .map_err(|_| FakeError("test dropped the call receiver".to_string()))?;
        result
            .await
            .map_err(|_| FakeError("test dropped the response sender".to_string()))?
    }
}

pub fn chan_sender() -> (Arc<ChanSender>, mpsc::UnboundedReceiver<BatchCall>) {
    let (calls, rx) = mpsc::unbounded_channel();
    (Arc::new(ChanSender { calls }), rx)
}
