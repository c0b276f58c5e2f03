//! # mazu-sharing
//!
//! Feed distribution daemon for the mazu sample catalogue.
//!
//! This binary runs two independent loops over the shared catalogue:
//! - **Subscriber supervisor** keeps one hpfeeds subscriber per configured
//!   channel, following operator edits to the channel registry, and ingests
//!   every received sample
//! - **Publish drain** pushes queued samples to their channels' publish
//!   topics until the broker accepts them

mod catalog;
mod config;
mod content_store;
mod dedup;
mod drain;
mod error;
mod ingest;
mod registry;
mod supervisor;
mod worker;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mazu_feed::{FeedConnector, HpfeedsConnector};
use mazu_shared::DetectorRegistry;
use mazu_store::Database;

use crate::catalog::{Catalog, SqliteCatalog};
use crate::config::SharingConfig;
use crate::content_store::{ContentStore, FsContentStore};
use crate::drain::PublishDrain;
use crate::ingest::IngestPipeline;
use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mazu_sharing=debug")),
        )
        .init();

    info!("Starting mazu sharing daemon v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = SharingConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the catalogue, the content store and the feed client
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            info!(path = %path.display(), "opening database");
            Database::open_at(path)?
        }
        None => Database::new()?,
    };
    let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::new(db));

    let content: Arc<dyn ContentStore> = Arc::new(
        FsContentStore::new(config.content_store_path.clone(), config.max_sample_size).await?,
    );

    let connector: Arc<dyn FeedConnector> = Arc::new(HpfeedsConnector::new(
        config.feed_connect_timeout,
        config.max_feed_frame,
    ));

    let detectors = DetectorRegistry::with_defaults();
    info!(detectors = ?detectors.names(), "File type detectors registered");

    let pipeline = Arc::new(IngestPipeline::new(
        catalog.clone(),
        content.clone(),
        detectors,
        config.notify_on_ingest,
        config.max_sample_size,
    ));

    // -----------------------------------------------------------------------
    // 4. Spawn the supervisor and the drain loop
    // -----------------------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut supervisor = Supervisor::new(
        catalog.clone(),
        connector.clone(),
        pipeline,
        config.worker_stop_timeout,
        config.restart_dead_workers,
    );
    let reconcile_interval = config.reconcile_interval;
    let supervisor_shutdown = shutdown_rx.clone();
    let supervisor_task = tokio::spawn(async move {
        supervisor.run(reconcile_interval, supervisor_shutdown).await;
    });

    let drain = PublishDrain::new(catalog, content, connector, config.publish_ack_timeout);
    let drain_interval = config.drain_interval;
    let drain_task = tokio::spawn(async move {
        drain.run(drain_interval, shutdown_rx).await;
    });

    // -----------------------------------------------------------------------
    // 5. Wait for Ctrl+C, then stop both loops
    // -----------------------------------------------------------------------
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    let _ = shutdown_tx.send(true);
    let (supervisor_result, drain_result) = tokio::join!(supervisor_task, drain_task);
    if let Err(e) = supervisor_result {
        tracing::error!(error = %e, "Supervisor task failed");
    }
    if let Err(e) = drain_result {
        tracing::error!(error = %e, "Drain task failed");
    }

    Ok(())
}
