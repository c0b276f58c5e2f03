//! CRUD operations for [`Sample`] records.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{opt_uuid_at, time_at, uuid_at, Sample};

const SAMPLE_COLUMNS: &str = "id, md5, sha1, sha256, sha512, ssdeep, crc32, filetype, size, \
     user_id, source_id, created_at";

impl Database {
    /// Insert a sample record.
    ///
    /// Fails with [`StoreError::Duplicate`] when a sample with the same
    /// sha256 already exists, even if a concurrent writer got there between
    /// the caller's existence check and this insert.
    pub fn create_sample(&self, sample: &Sample) -> Result<()> {
        let size = i64::try_from(sample.size)
            .map_err(|_| StoreError::InvalidData(format!("sample size {} out of range", sample.size)))?;
        self.conn()
            .execute(
                "INSERT INTO samples (id, md5, sha1, sha256, sha512, ssdeep, crc32, filetype,
                                      size, user_id, source_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    sample.id.to_string(),
                    sample.md5,
                    sample.sha1,
                    sample.sha256,
                    sample.sha512,
                    sample.ssdeep,
                    sample.crc32,
                    sample.filetype,
                    size,
                    sample.user_id.map(|u| u.to_string()),
                    sample.source_id.map(|s| s.to_string()),
                    sample.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::from_write(e, &sample.sha256))?;
        Ok(())
    }

    pub fn get_sample_by_sha256(&self, sha256: &str) -> Result<Sample> {
        self.conn()
            .query_row(
                &format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE sha256 = ?1"),
                params![sha256],
                row_to_sample,
            )
            .map_err(StoreError::from_read)
    }

    pub fn sample_exists(&self, sha256: &str) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM samples WHERE sha256 = ?1",
                params![sha256],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Samples owned by `user_id`, newest first.
    pub fn list_samples_for_user(&self, user_id: Uuid) -> Result<Vec<Sample>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM samples
             WHERE user_id = ?1
             ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_sample)?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?);
        }
        Ok(samples)
    }

    /// Delete a sample record. Queued publishes for it are dropped too.
    pub fn delete_sample_by_sha256(&self, sha256: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM samples WHERE sha256 = ?1", params![sha256])?;
        Ok(affected > 0)
    }
}

fn row_to_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sample> {
    let size: i64 = row.get(8)?;
    Ok(Sample {
        id: uuid_at(row, 0)?,
        md5: row.get(1)?,
        sha1: row.get(2)?,
        sha256: row.get(3)?,
        sha512: row.get(4)?,
        ssdeep: row.get(5)?,
        crc32: row.get(6)?,
        filetype: row.get(7)?,
        size: size.max(0) as u64,
        user_id: opt_uuid_at(row, 9)?,
        source_id: opt_uuid_at(row, 10)?,
        created_at: time_at(row, 11)?,
    })
}
