//! Periodic drain of the outbound publish queue.
//!
//! Each pass walks the unpublished entries in queue order and pushes the
//! sample bytes to the entry's channel. An entry is marked published only
//! when the broker did not object within the ack timeout; anything else
//! leaves it for the next pass. There is no retry cap and no backoff.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mazu_feed::{FeedConnection, FeedConnector};
use mazu_store::PendingPublish;

use crate::catalog::Catalog;
use crate::content_store::ContentStore;
use crate::error::Result;
use crate::registry::channel_config;

/// What one drain pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub published: usize,
    /// Connect, publish or broker errors; retried next pass.
    pub failed: usize,
    /// Blob missing or no publish topic; retried next pass.
    pub skipped: usize,
}

pub struct PublishDrain {
    catalog: Arc<dyn Catalog>,
    content: Arc<dyn ContentStore>,
    connector: Arc<dyn FeedConnector>,
    ack_timeout: Duration,
}

/// Connections opened during one pass, keyed by channel id.
#[derive(Default)]
struct PassConnections {
    open: HashMap<Uuid, Box<dyn FeedConnection>>,
    failed: HashSet<Uuid>,
}

impl PassConnections {
    async fn close_all(&mut self) {
        for (channel_id, mut conn) in self.open.drain() {
            if let Err(e) = conn.stop().await {
                debug!(%channel_id, error = %e, "Error closing publish connection");
            }
        }
    }

    async fn discard(&mut self, channel_id: Uuid) {
        if let Some(mut conn) = self.open.remove(&channel_id) {
            let _ = conn.stop().await;
        }
    }
}

impl PublishDrain {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        content: Arc<dyn ContentStore>,
        connector: Arc<dyn FeedConnector>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            content,
            connector,
            ack_timeout,
        }
    }

    /// Try every unpublished entry once.
    ///
    /// A content store failure aborts the pass; everything not yet marked
    /// published stays queued.
    pub async fn run_pass(&self) -> Result<DrainReport> {
        let pending = self.catalog.list_pending_publishes()?;
        if pending.is_empty() {
            return Ok(DrainReport::default());
        }
        debug!(count = pending.len(), "Draining publish queue");

        let mut connections = PassConnections::default();
        let mut report = DrainReport::default();
        let mut result = Ok(());
        for item in &pending {
            if let Err(e) = self.publish_one(item, &mut connections, &mut report).await {
                result = Err(e);
                break;
            }
        }
        connections.close_all().await;

        result.map(|()| report)
    }

    async fn publish_one(
        &self,
        item: &PendingPublish,
        connections: &mut PassConnections,
        report: &mut DrainReport,
    ) -> Result<()> {
        let entry_id = item.entry.id;
        let channel = channel_config(&item.channel);
        let channel_id = channel.channel_id;

        if connections.failed.contains(&channel_id) {
            report.failed += 1;
            return Ok(());
        }
        if channel.publish_topics.is_empty() {
            warn!(%entry_id, channel = %channel.key, "Channel has no publish topic");
            report.skipped += 1;
            return Ok(());
        }

        let Some(blob) = self.content.get(&item.sample_sha256).await? else {
            warn!(%entry_id, sha256 = %item.sample_sha256, "Blob missing, skipping entry");
            report.skipped += 1;
            return Ok(());
        };

        if !connections.open.contains_key(&channel_id) {
            match self.connector.connect(&channel.endpoint).await {
                Ok(conn) => {
                    connections.open.insert(channel_id, conn);
                }
                Err(e) => {
                    warn!(channel = %channel.key, error = %e, "Cannot connect for publishing");
                    connections.failed.insert(channel_id);
                    report.failed += 1;
                    return Ok(());
                }
            }
        }
        let Some(conn) = connections.open.get_mut(&channel_id) else {
            return Ok(());
        };

        let outcome = match conn.publish(&channel.publish_topics, &blob).await {
            Ok(()) => conn.wait(self.ack_timeout).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(None) => {
                self.catalog.mark_published(entry_id)?;
                debug!(%entry_id, sha256 = %item.sample_sha256, channel = %channel.key, "Published");
                report.published += 1;
            }
            Ok(Some(reason)) => {
                warn!(%entry_id, channel = %channel.key, %reason, "Broker rejected publish");
                connections.discard(channel_id).await;
                report.failed += 1;
            }
            Err(e) => {
                warn!(%entry_id, channel = %channel.key, error = %e, "Publish failed");
                connections.discard(channel_id).await;
                report.failed += 1;
            }
        }
        Ok(())
    }

    /// Drain every `interval` until `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_pass().await {
                        Ok(report) if report != DrainReport::default() => {
                            info!(?report, "Drained publish queue");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Drain pass aborted"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}
