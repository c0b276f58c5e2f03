//! One long-lived subscriber per channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use mazu_feed::{FeedConnector, FeedError, FeedEvent};
use mazu_shared::{ChannelConfig, ChannelKey};

use crate::error::Result;
use crate::ingest::{IngestOutcome, IngestPipeline};

/// A running subscriber task and the config it was started with.
pub struct SubscriberWorker {
    config: ChannelConfig,
    started_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

impl SubscriberWorker {
    /// Spawn the subscriber. The task connects, subscribes and ingests every
    /// message it receives until the broker errors or hangs up.
    pub fn spawn(
        config: ChannelConfig,
        connector: Arc<dyn FeedConnector>,
        pipeline: Arc<IngestPipeline>,
    ) -> Self {
        let task_config = config.clone();
        let handle = tokio::spawn(async move {
            let key = task_config.key.clone();
            match run(task_config, connector, pipeline).await {
                Ok(()) => info!(channel = %key, "Subscriber finished"),
                Err(e) => warn!(channel = %key, error = %e, "Subscriber exited"),
            }
        });

        Self {
            config,
            started_at: Utc::now(),
            handle,
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.config.key
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Abort the task and wait up to `timeout` for it to wind down.
    ///
    /// Returns `false` if the task did not finish in time; it is abandoned.
    /// Terminating a task that already exited is fine.
    pub async fn terminate(self, timeout: Duration) -> bool {
        let key = self.config.key.clone();
        self.handle.abort();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Err(e)) if e.is_panic() => {
                error!(channel = %key, "Subscriber task panicked");
                true
            }
            Ok(_) => {
                debug!(channel = %key, "Subscriber stopped");
                true
            }
            Err(_) => {
                warn!(channel = %key, ?timeout, "Subscriber did not stop in time, abandoning it");
                false
            }
        }
    }
}

async fn run(
    config: ChannelConfig,
    connector: Arc<dyn FeedConnector>,
    pipeline: Arc<IngestPipeline>,
) -> Result<()> {
    let mut conn = connector.connect(&config.endpoint).await?;
    conn.subscribe(&config.subscribe_topics).await?;
    info!(
        channel = %config.key,
        address = %config.endpoint.address(),
        topics = ?config.subscribe_topics,
        "Subscribed"
    );

    loop {
        let event = match conn.recv().await {
            Ok(event) => event,
            Err(FeedError::Closed) => {
                let _ = conn.stop().await;
                return Ok(());
            }
            Err(e) => {
                let _ = conn.stop().await;
                return Err(e.into());
            }
        };

        match event {
            FeedEvent::Message(message) => {
                // Serial per worker: the next message waits for this ingest.
                match pipeline
                    .ingest(&message.payload, Some(config.owner_id), config.source_id)
                    .await
                {
                    Ok(IngestOutcome::Stored { sha256, filetype }) => {
                        debug!(channel = %config.key, topic = %message.topic, %sha256, %filetype, "Ingested");
                    }
                    Ok(IngestOutcome::Duplicate { sha256 }) => {
                        debug!(channel = %config.key, %sha256, "Already have it");
                    }
                    Ok(IngestOutcome::Rejected { reason }) => {
                        warn!(channel = %config.key, topic = %message.topic, %reason, "Payload rejected");
                    }
                    Err(e) => {
                        error!(channel = %config.key, topic = %message.topic, error = %e, "Ingest failed");
                    }
                }
            }
            FeedEvent::Error(reason) => {
                warn!(channel = %config.key, %reason, "Broker reported an error");
                let _ = conn.stop().await;
                return Err(FeedError::Remote(reason).into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::registry::channel_config;
    use crate::testing::{eventually, Harness, StuckConnector};

    #[tokio::test]
    async fn test_terminate_idle_and_finished_workers() {
        let harness = Harness::new().await;
        harness.connector.make_unreachable("feeds-b");
        let idle = harness.add_channel("a", "feeds-a", "t1", "");
        let dead = harness.add_channel("b", "feeds-b", "t1", "");

        let connector: Arc<dyn FeedConnector> = Arc::new(harness.connector.clone());
        let idle = SubscriberWorker::spawn(channel_config(&idle), connector.clone(), harness.pipeline.clone());
        let dead = SubscriberWorker::spawn(channel_config(&dead), connector, harness.pipeline.clone());

        eventually(|| harness.connector.subscriptions().len() == 1 && !dead.is_alive()).await;
        assert!(idle.is_alive());
        assert!(idle.terminate(Duration::from_secs(1)).await);
        assert!(dead.terminate(Duration::from_secs(1)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_terminate_abandons_hung_task() {
        let harness = Harness::new().await;
        let channel = harness.add_channel("a", "feeds-a", "t1", "");
        let connector = StuckConnector::new(Duration::from_millis(1500));
        let worker = SubscriberWorker::spawn(
            channel_config(&channel),
            Arc::new(connector.clone()),
            harness.pipeline.clone(),
        );
        eventually(|| connector.entered()).await;

        let started = Instant::now();
        assert!(!worker.terminate(Duration::from_millis(100)).await);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
