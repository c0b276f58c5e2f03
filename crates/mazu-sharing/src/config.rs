//! Daemon configuration loaded from environment variables.
//!
//! Every setting has a default so the daemon starts with zero configuration
//! next to a local database.

use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingConfig {
    /// SQLite catalogue file.
    /// Env: `DATABASE_PATH`
    /// Default: the platform data directory (`mazu/mazu.db`).
    pub database_path: Option<PathBuf>,

    /// Directory of the content-addressed sample store.
    /// Env: `CONTENT_STORE_PATH`
    /// Default: `./samples`
    pub content_store_path: PathBuf,

    /// How often the channel registry is re-read and diffed.
    /// Env: `RECONCILE_INTERVAL_SECS`
    /// Default: 10 s
    pub reconcile_interval: Duration,

    /// How often the publish queue is drained.
    /// Env: `DRAIN_INTERVAL_SECS`
    /// Default: 30 s
    pub drain_interval: Duration,

    /// Upper bound on waiting for an aborted subscriber to wind down.
    /// Env: `WORKER_STOP_TIMEOUT_SECS`
    pub worker_stop_timeout: Duration,

    /// Env: `FEED_CONNECT_TIMEOUT_SECS`
    pub feed_connect_timeout: Duration,

    /// How long the broker gets to reject a publish before it counts as
    /// delivered.
    /// Env: `PUBLISH_ACK_TIMEOUT_MS`
    pub publish_ack_timeout: Duration,

    /// Largest sample accepted for ingest, in bytes.
    /// Env: `MAX_SAMPLE_SIZE`
    pub max_sample_size: usize,

    /// Largest hpfeeds frame accepted from a broker, in bytes.
    /// Env: `MAX_FEED_FRAME`
    pub max_feed_frame: usize,

    /// Restart subscribers whose task died while their channel is unchanged.
    /// Env: `RESTART_DEAD_WORKERS` (true/false)
    pub restart_dead_workers: bool,

    /// Write a notification for the channel owner on every stored sample.
    /// Env: `NOTIFY_ON_INGEST` (true/false)
    pub notify_on_ingest: bool,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            content_store_path: PathBuf::from("./samples"),
            reconcile_interval: Duration::from_secs(10),
            drain_interval: Duration::from_secs(30),
            worker_stop_timeout: Duration::from_secs(5),
            feed_connect_timeout: Duration::from_secs(10),
            publish_ack_timeout: Duration::from_millis(1000),
            max_sample_size: 64 * 1024 * 1024, // 64 MiB
            max_feed_frame: 64 * 1024 * 1024,
            restart_dead_workers: true,
            notify_on_ingest: true,
        }
    }
}

impl SharingConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Invalid values are
    /// logged and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("CONTENT_STORE_PATH").filter(|p| !p.is_empty()) {
            config.content_store_path = PathBuf::from(path);
        }

        if let Some(secs) = parse_positive(&lookup, "RECONCILE_INTERVAL_SECS") {
            config.reconcile_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive(&lookup, "DRAIN_INTERVAL_SECS") {
            config.drain_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive(&lookup, "WORKER_STOP_TIMEOUT_SECS") {
            config.worker_stop_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive(&lookup, "FEED_CONNECT_TIMEOUT_SECS") {
            config.feed_connect_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_positive(&lookup, "PUBLISH_ACK_TIMEOUT_MS") {
            config.publish_ack_timeout = Duration::from_millis(ms);
        }

        if let Some(size) = parse_positive(&lookup, "MAX_SAMPLE_SIZE") {
            config.max_sample_size = size as usize;
        }
        if let Some(size) = parse_positive(&lookup, "MAX_FEED_FRAME") {
            config.max_feed_frame = size as usize;
        }

        if let Some(val) = lookup("RESTART_DEAD_WORKERS") {
            config.restart_dead_workers = parse_flag(&val);
        }
        if let Some(val) = lookup("NOTIFY_ON_INGEST") {
            config.notify_on_ingest = parse_flag(&val);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

fn parse_flag(val: &str) -> bool {
    let val = val.trim();
    val != "false" && val != "0"
}
