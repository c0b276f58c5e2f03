//! In-process fakes for the daemon's seams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use mazu_feed::{FeedConnection, FeedConnector, FeedError, FeedEvent};
use mazu_shared::{DetectorRegistry, FeedEndpoint};
use mazu_store::{Channel, Database, Notification, PendingPublish, Sample, StoreError, User};

use crate::catalog::{Catalog, SqliteCatalog};
use crate::content_store::{Attributes, ContentStore, FsContentStore, StoredBlob};
use crate::drain::PublishDrain;
use crate::error::{ContentStoreError, Result, SharingError};
use crate::ingest::IngestPipeline;
use crate::supervisor::Supervisor;

/// Poll `check` until it holds, failing the test after about two seconds.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub host: String,
    pub topics: Vec<String>,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct BrokerState {
    connects: usize,
    stops: usize,
    unreachable: HashSet<String>,
    rejecting: HashSet<String>,
    scripted: HashMap<String, VecDeque<FeedEvent>>,
    subscriptions: Vec<(String, Vec<String>)>,
    published: Vec<Published>,
}

/// A broker per host name, all living in memory.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryConnector {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap()
    }

    pub fn make_unreachable(&self, host: &str) {
        self.state().unreachable.insert(host.to_string());
    }

    pub fn make_reachable(&self, host: &str) {
        self.state().unreachable.remove(host);
    }

    pub fn reject_publishes(&self, host: &str) {
        self.state().rejecting.insert(host.to_string());
    }

    pub fn accept_publishes(&self, host: &str) {
        self.state().rejecting.remove(host);
    }

    /// Queue an event for the next subscriber reading from `host`.
    pub fn script(&self, host: &str, event: FeedEvent) {
        self.state()
            .scripted
            .entry(host.to_string())
            .or_default()
            .push_back(event);
    }

    /// Connection attempts, failed ones included.
    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn stops(&self) -> usize {
        self.state().stops
    }

    pub fn subscriptions(&self) -> Vec<(String, Vec<String>)> {
        self.state().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.state().published.clone()
    }
}

#[async_trait]
impl FeedConnector for MemoryConnector {
    async fn connect(&self, endpoint: &FeedEndpoint) -> std::result::Result<Box<dyn FeedConnection>, FeedError> {
        let mut state = self.state();
        state.connects += 1;
        if state.unreachable.contains(&endpoint.host) {
            return Err(FeedError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(Box::new(MemoryConnection {
            host: endpoint.host.clone(),
            state: self.state.clone(),
            pending_error: None,
        }))
    }
}

struct MemoryConnection {
    host: String,
    state: Arc<Mutex<BrokerState>>,
    pending_error: Option<String>,
}

#[async_trait]
impl FeedConnection for MemoryConnection {
    async fn subscribe(&mut self, topics: &[String]) -> std::result::Result<(), FeedError> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .push((self.host.clone(), topics.to_vec()));
        Ok(())
    }

    async fn publish(&mut self, topics: &[String], payload: &[u8]) -> std::result::Result<(), FeedError> {
        let mut state = self.state.lock().unwrap();
        if state.rejecting.contains(&self.host) {
            self.pending_error = Some("accessfail".to_string());
        } else {
            state.published.push(Published {
                host: self.host.clone(),
                topics: topics.to_vec(),
                payload: payload.to_vec(),
            });
        }
        Ok(())
    }

    async fn recv(&mut self) -> std::result::Result<FeedEvent, FeedError> {
        let next = self
            .state
            .lock()
            .unwrap()
            .scripted
            .get_mut(&self.host)
            .and_then(VecDeque::pop_front);
        match next {
            Some(event) => Ok(event),
            // Idle subscriber: block until aborted.
            None => std::future::pending().await,
        }
    }

    async fn wait(&mut self, _timeout: Duration) -> std::result::Result<Option<String>, FeedError> {
        Ok(self.pending_error.take())
    }

    async fn stop(&mut self) -> std::result::Result<(), FeedError> {
        self.state.lock().unwrap().stops += 1;
        Ok(())
    }
}

/// A broker whose connect call blocks its thread without yielding, so an
/// aborted worker cannot unwind until the block ends.
#[derive(Clone)]
pub struct StuckConnector {
    block_for: Duration,
    entered: Arc<AtomicBool>,
}

impl StuckConnector {
    pub fn new(block_for: Duration) -> Self {
        Self {
            block_for,
            entered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether some worker is (or was) stuck in `connect`.
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedConnector for StuckConnector {
    async fn connect(&self, _endpoint: &FeedEndpoint) -> std::result::Result<Box<dyn FeedConnection>, FeedError> {
        self.entered.store(true, Ordering::SeqCst);
        std::thread::sleep(self.block_for);
        Err(FeedError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Catalog / content store
// ---------------------------------------------------------------------------

fn forced(what: &str) -> SharingError {
    SharingError::Store(StoreError::InvalidData(format!("forced {what} failure")))
}

/// [`SqliteCatalog`] with switches that make individual calls fail.
pub struct FlakyCatalog {
    inner: SqliteCatalog,
    pub fail_list_channels: AtomicBool,
    pub fail_create_sample: AtomicBool,
    pub fail_notifications: AtomicBool,
    /// Report every sample as unknown, as if the pre-check lost a race.
    pub hide_existing: AtomicBool,
}

impl FlakyCatalog {
    pub fn new(db: Database) -> Self {
        Self {
            inner: SqliteCatalog::new(db),
            fail_list_channels: AtomicBool::new(false),
            fail_create_sample: AtomicBool::new(false),
            fail_notifications: AtomicBool::new(false),
            hide_existing: AtomicBool::new(false),
        }
    }

    pub fn db(&self) -> MutexGuard<'_, Database> {
        self.inner.lock()
    }
}

impl Catalog for FlakyCatalog {
    fn list_channels(&self) -> Result<Vec<Channel>> {
        if self.fail_list_channels.load(Ordering::SeqCst) {
            return Err(forced("list_channels"));
        }
        self.inner.list_channels()
    }

    fn sample_exists(&self, sha256: &str) -> Result<bool> {
        if self.hide_existing.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.sample_exists(sha256)
    }

    fn create_sample(&self, sample: &Sample) -> Result<()> {
        if self.fail_create_sample.load(Ordering::SeqCst) {
            return Err(forced("create_sample"));
        }
        self.inner.create_sample(sample)
    }

    fn delete_sample(&self, sha256: &str) -> Result<bool> {
        self.inner.delete_sample(sha256)
    }

    fn create_notification(&self, notification: &Notification) -> Result<()> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(forced("create_notification"));
        }
        self.inner.create_notification(notification)
    }

    fn list_pending_publishes(&self) -> Result<Vec<PendingPublish>> {
        self.inner.list_pending_publishes()
    }

    fn mark_published(&self, entry_id: Uuid) -> Result<bool> {
        self.inner.mark_published(entry_id)
    }
}

/// Content store whose disk is gone.
pub struct BrokenContentStore;

fn broken() -> ContentStoreError {
    ContentStoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"))
}

#[async_trait]
impl ContentStore for BrokenContentStore {
    async fn put(&self, _content: &[u8], _attributes: &Attributes) -> std::result::Result<StoredBlob, ContentStoreError> {
        Err(broken())
    }

    async fn find(&self, _attribute: &str, _value: &str) -> std::result::Result<Option<Vec<u8>>, ContentStoreError> {
        Err(broken())
    }

    async fn delete(&self, _attribute: &str, _value: &str) -> std::result::Result<bool, ContentStoreError> {
        Err(broken())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A catalogue with one user, an on-disk content store, an ingest pipeline
/// and a memory broker, wired the way `main` wires the real ones.
pub struct Harness {
    pub dir: TempDir,
    pub catalog: Arc<FlakyCatalog>,
    pub content: Arc<FsContentStore>,
    pub connector: MemoryConnector,
    pub pipeline: Arc<IngestPipeline>,
    pub owner: User,
}

pub struct HarnessBuilder {
    max_size: usize,
    notify: bool,
}

impl HarnessBuilder {
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub async fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(&dir.path().join("catalog.db")).unwrap();
        let owner = User {
            id: Uuid::new_v4(),
            username: "analyst".to_string(),
            created_at: Utc::now(),
        };
        db.create_user(&owner).unwrap();

        let catalog = Arc::new(FlakyCatalog::new(db));
        let content = Arc::new(
            FsContentStore::new(dir.path().join("samples"), self.max_size)
                .await
                .unwrap(),
        );
        let pipeline = Arc::new(IngestPipeline::new(
            catalog.clone(),
            content.clone(),
            DetectorRegistry::with_defaults(),
            self.notify,
            self.max_size,
        ));

        Harness {
            dir,
            catalog,
            content,
            connector: MemoryConnector::default(),
            pipeline,
            owner,
        }
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            max_size: 1024 * 1024,
            notify: true,
        }
    }

    pub fn db(&self) -> MutexGuard<'_, Database> {
        self.catalog.db()
    }

    /// Blobs on disk, sidecars and temp files not counted.
    pub fn blob_count(&self) -> usize {
        count_blobs(&self.dir.path().join("samples"))
    }

    /// Store a channel owned by the harness user.
    pub fn add_channel(&self, name: &str, host: &str, subchans: &str, pubchans: &str) -> Channel {
        let now = Utc::now();
        let channel = Channel {
            id: Uuid::new_v4(),
            owner_id: self.owner.id,
            name: name.to_string(),
            host: host.to_string(),
            port: 10000,
            subchans: subchans.to_string(),
            pubchans: pubchans.to_string(),
            ident: "mazu".to_string(),
            secret: "secret".to_string(),
            is_default: false,
            source_id: None,
            created_at: now,
            updated_at: now,
        };
        self.db().create_channel(&channel).unwrap();
        channel
    }

    pub fn supervisor(&self, restart_dead_workers: bool) -> Supervisor {
        Supervisor::new(
            self.catalog.clone(),
            Arc::new(self.connector.clone()),
            self.pipeline.clone(),
            Duration::from_secs(1),
            restart_dead_workers,
        )
    }

    pub fn drain(&self) -> PublishDrain {
        PublishDrain::new(
            self.catalog.clone(),
            self.content.clone(),
            Arc::new(self.connector.clone()),
            Duration::from_millis(10),
        )
    }
}

fn count_blobs(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            !name.ends_with(".json") && !name.starts_with('.')
        })
        .count()
}
