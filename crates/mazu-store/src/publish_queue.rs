//! CRUD operations for the outbound [`PublishQueueEntry`] queue.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::channels::{is_invalid_value, row_to_channel, CHANNEL_COLUMNS};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{time_at, uuid_at, PendingPublish, PublishQueueEntry, Sample};

const ENTRY_COLUMNS: &str = "q.id, q.sample_id, q.channel_id, q.published, q.created_at, q.updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Queue `sample_id` for publishing on `channel_id`.
    pub fn enqueue_publish(&self, sample_id: Uuid, channel_id: Uuid) -> Result<PublishQueueEntry> {
        let now = Utc::now();
        let entry = PublishQueueEntry {
            id: Uuid::new_v4(),
            sample_id,
            channel_id,
            published: false,
            created_at: now,
            updated_at: now,
        };
        insert_entry(self.conn(), &entry)?;
        Ok(entry)
    }

    /// Queue `sample` on every default channel of its owner. Returns the
    /// number of entries created.
    pub fn enqueue_default_publishes(&self, sample: &Sample) -> Result<usize> {
        let Some(owner_id) = sample.user_id else {
            return Ok(0);
        };
        let channels = self.list_default_channels_for_owner(owner_id)?;
        if channels.is_empty() {
            return Ok(0);
        }

        let tx = self.conn().unchecked_transaction()?;
        let now = Utc::now();
        for channel in &channels {
            insert_entry(
                &tx,
                &PublishQueueEntry {
                    id: Uuid::new_v4(),
                    sample_id: sample.id,
                    channel_id: channel.id,
                    published: false,
                    created_at: now,
                    updated_at: now,
                },
            )?;
        }
        tx.commit()?;

        tracing::debug!(sha256 = %sample.sha256, count = channels.len(), "queued default publishes");
        Ok(channels.len())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_publish_entry(&self, id: Uuid) -> Result<PublishQueueEntry> {
        self.conn()
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM publish_queue q WHERE q.id = ?1"),
                params![id.to_string()],
                row_to_entry,
            )
            .map_err(StoreError::from_read)
    }

    /// Every unpublished entry with its sample digest and target channel,
    /// in the order the entries were queued. Entries whose channel row holds
    /// invalid values are left out.
    pub fn list_pending_publishes(&self) -> Result<Vec<PendingPublish>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ENTRY_COLUMNS}, s.sha256, {CHANNEL_COLUMNS}
             FROM publish_queue q
             JOIN samples s ON s.id = q.sample_id
             JOIN channels c ON c.id = q.channel_id
             WHERE q.published = 0
             ORDER BY q.rowid ASC"
        ))?;

        let rows = stmt.query_map([], |row| {
            let entry = row_to_entry(row)?;
            let sample_sha256: String = row.get(6)?;
            Ok((entry, sample_sha256, row_to_channel(row, 7)))
        })?;

        let mut pending = Vec::new();
        for row in rows {
            let (entry, sample_sha256, channel) = row?;
            match channel {
                Ok(channel) => pending.push(PendingPublish {
                    entry,
                    sample_sha256,
                    channel,
                }),
                Err(e) if is_invalid_value(&e) => {
                    tracing::warn!(
                        entry = %entry.id,
                        channel = %entry.channel_id,
                        error = %e,
                        "skipping queued publish for invalid channel row"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(pending)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Flip an entry to published. Returns `false` if it was already
    /// published or does not exist; the flag never goes back.
    pub fn mark_published(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE publish_queue SET published = 1, updated_at = ?2
             WHERE id = ?1 AND published = 0",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insert_entry(conn: &rusqlite::Connection, entry: &PublishQueueEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO publish_queue (id, sample_id, channel_id, published, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id.to_string(),
            entry.sample_id.to_string(),
            entry.channel_id.to_string(),
            entry.published,
            entry.created_at.to_rfc3339(),
            entry.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<PublishQueueEntry> {
    Ok(PublishQueueEntry {
        id: uuid_at(row, 0)?,
        sample_id: uuid_at(row, 1)?,
        channel_id: uuid_at(row, 2)?,
        published: row.get(3)?,
        created_at: time_at(row, 4)?,
        updated_at: time_at(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::fixtures;
    use mazu_shared::identify;

    fn stored_sample(db: &Database, body: &[u8], owner: Option<Uuid>) -> Sample {
        let sample = Sample::from_digests(&identify(body), "data", owner, None);
        db.create_sample(&sample).unwrap();
        sample
    }

    #[test]
    fn pending_in_queue_order_with_join() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let channel = fixtures::channel(&alice, "share");
        db.create_channel(&channel).unwrap();

        let first = stored_sample(&db, b"one", None);
        let second = stored_sample(&db, b"two", None);
        let e1 = db.enqueue_publish(first.id, channel.id).unwrap();
        let e2 = db.enqueue_publish(second.id, channel.id).unwrap();

        let pending = db.list_pending_publishes().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].entry.id, e1.id);
        assert_eq!(pending[0].sample_sha256, first.sha256);
        assert_eq!(pending[0].channel, channel);
        assert_eq!(pending[1].entry.id, e2.id);
    }

    #[test]
    fn invalid_channel_row_does_not_hide_other_entries() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let good = fixtures::channel(&alice, "good");
        let bad = fixtures::channel(&alice, "bad");
        db.create_channel(&good).unwrap();
        db.create_channel(&bad).unwrap();

        let sample = stored_sample(&db, b"payload", None);
        db.enqueue_publish(sample.id, bad.id).unwrap();
        let kept = db.enqueue_publish(sample.id, good.id).unwrap();
        fixtures::set_port(&db, bad.id, 70000);

        let pending = db.list_pending_publishes().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry.id, kept.id);
        assert_eq!(pending[0].channel, good);
    }

    #[test]
    fn mark_published_is_terminal() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let channel = fixtures::channel(&alice, "share");
        db.create_channel(&channel).unwrap();
        let sample = stored_sample(&db, b"payload", None);
        let entry = db.enqueue_publish(sample.id, channel.id).unwrap();

        assert!(db.mark_published(entry.id).unwrap());
        assert!(!db.mark_published(entry.id).unwrap());
        assert!(db.get_publish_entry(entry.id).unwrap().published);
        assert!(db.list_pending_publishes().unwrap().is_empty());
    }

    #[test]
    fn default_publishes_follow_owner_defaults() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let mut a = fixtures::channel(&alice, "a");
        a.is_default = true;
        let mut b = fixtures::channel(&alice, "b");
        b.is_default = true;
        db.create_channel(&a).unwrap();
        db.create_channel(&b).unwrap();
        db.create_channel(&fixtures::channel(&alice, "c")).unwrap();

        let owned = stored_sample(&db, b"owned", Some(alice.id));
        assert_eq!(db.enqueue_default_publishes(&owned).unwrap(), 2);

        let orphan = stored_sample(&db, b"orphan", None);
        assert_eq!(db.enqueue_default_publishes(&orphan).unwrap(), 0);
        assert_eq!(db.list_pending_publishes().unwrap().len(), 2);
    }

    #[test]
    fn deleting_sample_drops_its_entries() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let channel = fixtures::channel(&alice, "share");
        db.create_channel(&channel).unwrap();
        let sample = stored_sample(&db, b"gone", None);
        db.enqueue_publish(sample.id, channel.id).unwrap();

        db.delete_sample_by_sha256(&sample.sha256).unwrap();
        assert!(db.list_pending_publishes().unwrap().is_empty());
    }
}
