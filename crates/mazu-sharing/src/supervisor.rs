//! Keeps one subscriber running per channel in the registry.
//!
//! Every pass reads a fresh snapshot, diffs it against the snapshot applied
//! last time and starts, stops or restarts workers to match. The supervisor
//! is the only owner of the worker map.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use mazu_feed::FeedConnector;
use mazu_shared::{ChannelConfig, ChannelKey};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::ingest::IngestPipeline;
use crate::registry::{self, RegistryDiff, Snapshot};
use crate::worker::SubscriberWorker;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Workers spawned for channels that had none.
    pub started: usize,
    /// Workers terminated because their channel is gone or no longer
    /// subscribes to anything.
    pub stopped: usize,
    /// Workers replaced because their channel's config changed.
    pub restarted: usize,
    /// Dead workers respawned for unchanged channels.
    pub revived: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

pub struct Supervisor {
    catalog: Arc<dyn Catalog>,
    connector: Arc<dyn FeedConnector>,
    pipeline: Arc<IngestPipeline>,
    workers: BTreeMap<ChannelKey, SubscriberWorker>,
    /// Last applied snapshot; `None` until the first successful pass.
    baseline: Option<Snapshot>,
    stop_timeout: Duration,
    restart_dead_workers: bool,
}

impl Supervisor {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        connector: Arc<dyn FeedConnector>,
        pipeline: Arc<IngestPipeline>,
        stop_timeout: Duration,
        restart_dead_workers: bool,
    ) -> Self {
        Self {
            catalog,
            connector,
            pipeline,
            workers: BTreeMap::new(),
            baseline: None,
            stop_timeout,
            restart_dead_workers,
        }
    }

    pub fn live_workers(&self) -> usize {
        self.workers.values().filter(|w| w.is_alive()).count()
    }

    /// Bring the worker map in line with the registry.
    ///
    /// A failed registry read leaves everything as it was; the next pass
    /// retries against the same baseline.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport> {
        let current = registry::snapshot(self.catalog.as_ref())?;
        let diff = match &self.baseline {
            Some(previous) => registry::diff(previous, &current),
            None => RegistryDiff {
                added: current.keys().cloned().collect(),
                ..RegistryDiff::default()
            },
        };

        if !diff.is_empty() {
            debug!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                changed = diff.changed.len(),
                "Channel registry changed"
            );
        }

        let mut report = ReconcileReport::default();

        for key in &diff.removed {
            if let Some(worker) = self.workers.remove(key) {
                worker.terminate(self.stop_timeout).await;
                report.stopped += 1;
            }
            info!(channel = %key, "Channel removed");
        }

        for key in &diff.changed {
            let had_worker = match self.workers.remove(key) {
                Some(worker) => {
                    worker.terminate(self.stop_timeout).await;
                    true
                }
                None => false,
            };
            let started = current
                .get(key)
                .is_some_and(|config| self.start_worker(config));
            match (had_worker, started) {
                (true, true) => {
                    info!(channel = %key, "Channel changed, subscriber restarted");
                    report.restarted += 1;
                }
                (true, false) => {
                    info!(channel = %key, "Channel changed, subscriber stopped");
                    report.stopped += 1;
                }
                (false, true) => {
                    info!(channel = %key, "Channel changed, subscriber started");
                    report.started += 1;
                }
                (false, false) => debug!(channel = %key, "Channel changed"),
            }
        }

        for key in &diff.added {
            if let Some(config) = current.get(key) {
                if self.start_worker(config) {
                    report.started += 1;
                }
            }
        }

        if self.restart_dead_workers {
            report.revived = self.revive_dead(&diff);
        }

        self.baseline = Some(current);
        Ok(report)
    }

    // A dead worker of an untouched channel restarts with the config it
    // had, which is still the current one.
    fn revive_dead(&mut self, diff: &RegistryDiff) -> usize {
        let dead: Vec<ChannelKey> = self
            .workers
            .iter()
            .filter(|(key, worker)| !worker.is_alive() && !diff.touches(key))
            .map(|(key, _)| key.clone())
            .collect();

        let mut revived = 0;
        for key in dead {
            let Some(worker) = self.workers.remove(&key) else {
                continue;
            };
            let uptime = Utc::now() - worker.started_at();
            warn!(
                channel = %key,
                uptime_secs = uptime.num_seconds(),
                "Subscriber died, restarting"
            );
            if self.start_worker(worker.config()) {
                revived += 1;
            }
        }
        revived
    }

    /// Returns `false` for channels that only publish.
    fn start_worker(&mut self, config: &ChannelConfig) -> bool {
        if !config.wants_subscription() {
            debug!(channel = %config.key, "No subscribe topics, not starting a subscriber");
            return false;
        }
        let worker = SubscriberWorker::spawn(
            config.clone(),
            self.connector.clone(),
            self.pipeline.clone(),
        );
        debug!(channel = %worker.key(), "Subscriber started");
        self.workers.insert(config.key.clone(), worker);
        true
    }

    /// Reconcile every `interval` until `shutdown` flips, then stop all
    /// workers.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile().await {
                        Ok(report) if !report.is_noop() => {
                            info!(?report, live = self.live_workers(), "Reconciled channel registry");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Reconciliation pass failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        self.shutdown().await;
    }

    /// Terminate every worker.
    pub async fn shutdown(&mut self) {
        let workers = std::mem::take(&mut self.workers);
        let count = workers.len();
        for (_, worker) in workers {
            worker.terminate(self.stop_timeout).await;
        }
        info!(count, "All subscribers stopped");
    }
}

#[cfg(test)]
impl Supervisor {
    pub fn worker_keys(&self) -> Vec<ChannelKey> {
        self.workers.keys().cloned().collect()
    }

    /// Config the worker for `key` was started with, if one is running.
    pub fn worker_config(&self, key: &ChannelKey) -> Option<&ChannelConfig> {
        self.workers.get(key).map(SubscriberWorker::config)
    }
}
