//! Walkthrough: batch point lookups against a sharded in-memory store.
//!
//! Run with: cargo run --example batching

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use request_batcher::{
    BatchRequest, BatchResponse, Batcher, CallContext, Config, Sender, Supervisor,
};

/// A "remote" store with per-call overhead worth amortizing.
struct ShardStore {
    shards: HashMap<u64, HashMap<String, String>>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("shard {0} does not exist")]
struct NoSuchShard(u64);

#[async_trait]
impl Sender for ShardStore {
    type Destination = u64;
    type Request = String;
    type Response = Option<String>;
    type Error = NoSuchShard;

    async fn send(
        &self,
        batch: BatchRequest<u64, String>,
    ) -> Result<BatchResponse<Option<String>>, NoSuchShard> {
        // Fixed per-call cost, independent of batch size.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let shard = self
            .shards
            .get(&batch.destination)
            .ok_or(NoSuchShard(batch.destination))?;
        let responses = batch
            .requests
            .iter()
            .map(|key| shard.get(key).cloned())
            .collect();
        Ok(BatchResponse::new(responses))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut shards: HashMap<u64, HashMap<String, String>> = HashMap::new();
    for shard in 0..3u64 {
        let data = (0..8)
            .map(|i| (format!("k{i}"), format!("v{i}@shard{shard}")))
            .collect();
        shards.insert(shard, data);
    }

    let supervisor = Supervisor::new();
    let batcher = Batcher::new(
        Config::new()
            .with_sender(Arc::new(ShardStore { shards }))
            .with_supervisor(supervisor.clone())
            .with_max_msgs_per_batch(4)
            .with_max_wait(Duration::from_millis(10)),
    );

    // Twelve concurrent lookups across three shards become at most a
    // handful of downstream calls.
    let mut lookups = Vec::new();
    for i in 0..12u64 {
        let batcher = batcher.clone();
        lookups.push(tokio::spawn(async move {
            let shard = i % 3;
            let key = format!("k{}", i % 8);
            let value = batcher
                .send(&CallContext::new(), shard, key.clone())
                .await;
            (shard, key, value)
        }));
    }

    for lookup in lookups {
        let (shard, key, value) = lookup.await.unwrap();
        match value {
            Ok(Some(v)) => println!("shard {shard} {key} => {v}"),
            Ok(None) => println!("shard {shard} {key} => <missing>"),
            Err(err) => println!("shard {shard} {key} => error: {err}"),
        }
    }

    let stats = batcher.stats();
    println!(
        "\n{} lookups in {} downstream calls ({} failed)",
        stats.requests_dispatched, stats.batches_dispatched, stats.failed_batches
    );

    supervisor.stop().await;
}
