//! The daemon's view of the metadata store.
//!
//! Loops and workers only see the [`Catalog`] trait; production wires in
//! [`SqliteCatalog`], tests wrap it to inject failures.

use std::sync::Mutex;

use uuid::Uuid;

use mazu_store::{Channel, Database, Notification, PendingPublish, Sample};

use crate::error::{Result, SharingError};

pub trait Catalog: Send + Sync {
    /// Every channel row, read in one statement.
    fn list_channels(&self) -> Result<Vec<Channel>>;

    fn sample_exists(&self, sha256: &str) -> Result<bool>;

    /// Insert a sample; a taken sha256 surfaces as a duplicate error
    /// (see [`SharingError::is_duplicate`]).
    fn create_sample(&self, sample: &Sample) -> Result<()>;

    #[cfg(test)]
    fn delete_sample(&self, sha256: &str) -> Result<bool>;

    fn create_notification(&self, notification: &Notification) -> Result<()>;

    fn list_pending_publishes(&self) -> Result<Vec<PendingPublish>>;

    fn mark_published(&self, entry_id: Uuid) -> Result<bool>;
}

/// [`Catalog`] over a single SQLite connection shared behind a mutex.
pub struct SqliteCatalog {
    db: Mutex<Database>,
}

impl SqliteCatalog {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> mazu_store::Result<T>) -> Result<T> {
        let db = self.db.lock().map_err(|_| SharingError::CatalogPoisoned)?;
        Ok(f(&db)?)
    }
}

impl Catalog for SqliteCatalog {
    fn list_channels(&self) -> Result<Vec<Channel>> {
        self.with_db(|db| db.list_channels())
    }

    fn sample_exists(&self, sha256: &str) -> Result<bool> {
        self.with_db(|db| db.sample_exists(sha256))
    }

    fn create_sample(&self, sample: &Sample) -> Result<()> {
        self.with_db(|db| db.create_sample(sample))
    }

    #[cfg(test)]
    fn delete_sample(&self, sha256: &str) -> Result<bool> {
        self.with_db(|db| db.delete_sample_by_sha256(sha256))
    }

    fn create_notification(&self, notification: &Notification) -> Result<()> {
        self.with_db(|db| db.create_notification(notification))
    }

    fn list_pending_publishes(&self) -> Result<Vec<PendingPublish>> {
        self.with_db(|db| db.list_pending_publishes())
    }

    fn mark_published(&self, entry_id: Uuid) -> Result<bool> {
        self.with_db(|db| db.mark_published(entry_id))
    }
}

#[cfg(test)]
impl SqliteCatalog {
    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mazu_shared::identify;

    #[test]
    fn test_duplicate_sample_is_flagged() {
        let catalog = SqliteCatalog::new(Database::open_in_memory().unwrap());
        let sample = Sample::from_digests(&identify(b"x"), "data", None, None);
        catalog.create_sample(&sample).unwrap();

        let again = Sample::from_digests(&identify(b"x"), "data", None, None);
        let err = catalog.create_sample(&again).unwrap_err();
        assert!(err.is_duplicate());
        assert!(catalog.sample_exists(&sample.sha256).unwrap());
        assert!(catalog.delete_sample(&sample.sha256).unwrap());
        assert!(!catalog.sample_exists(&sample.sha256).unwrap());
    }
}
