//! CRUD operations for [`Channel`] records.

use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{opt_uuid_at, time_at, uuid_at, Channel};

pub(crate) const CHANNEL_COLUMNS: &str = "c.id, c.owner_id, c.name, c.host, c.port, c.subchans, \
     c.pubchans, c.ident, c.secret, c.is_default, c.source_id, c.created_at, c.updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new channel. `(owner_id, name)` must be unique.
    pub fn create_channel(&self, channel: &Channel) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO channels (id, owner_id, name, host, port, subchans, pubchans,
                                       ident, secret, is_default, source_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    channel.id.to_string(),
                    channel.owner_id.to_string(),
                    channel.name,
                    channel.host,
                    channel.port,
                    channel.subchans,
                    channel.pubchans,
                    channel.ident,
                    channel.secret,
                    channel.is_default,
                    channel.source_id.map(|s| s.to_string()),
                    channel.created_at.to_rfc3339(),
                    channel.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::from_write(e, &channel.name))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single channel by UUID.
    pub fn get_channel(&self, id: Uuid) -> Result<Channel> {
        self.conn()
            .query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels c WHERE c.id = ?1"),
                params![id.to_string()],
                |row| row_to_channel(row, 0),
            )
            .map_err(StoreError::from_read)
    }

    /// List every channel, ordered by owner then name.
    ///
    /// This is a single statement, so the result is a consistent view of the
    /// registry even while the operator edits it.
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        self.query_channels(
            &format!("SELECT {CHANNEL_COLUMNS} FROM channels c ORDER BY c.owner_id, c.name"),
            params![],
        )
    }

    pub fn list_channels_for_owner(&self, owner_id: Uuid) -> Result<Vec<Channel>> {
        self.query_channels(
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels c WHERE c.owner_id = ?1 ORDER BY c.name"
            ),
            params![owner_id.to_string()],
        )
    }

    /// Channels new samples of `owner_id` are pushed to automatically.
    pub fn list_default_channels_for_owner(&self, owner_id: Uuid) -> Result<Vec<Channel>> {
        self.query_channels(
            &format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels c
                 WHERE c.owner_id = ?1 AND c.is_default = 1
                 ORDER BY c.name"
            ),
            params![owner_id.to_string()],
        )
    }

    // A row the operator filled with bad values is skipped on its own so the
    // remaining channels stay usable.
    fn query_channels(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            let id: String = row.get(0)?;
            Ok((id, row_to_channel(row, 0)))
        })?;

        let mut channels = Vec::new();
        for row in rows {
            let (id, channel) = row?;
            match channel {
                Ok(channel) => channels.push(channel),
                Err(e) if is_invalid_value(&e) => {
                    tracing::warn!(channel = %id, error = %e, "skipping invalid channel row");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(channels)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite every editable column of an existing channel and bump
    /// `updated_at`. Returns `false` if the channel does not exist.
    pub fn update_channel(&self, channel: &Channel) -> Result<bool> {
        let affected = self
            .conn()
            .execute(
                "UPDATE channels
                 SET name = ?2, host = ?3, port = ?4, subchans = ?5, pubchans = ?6,
                     ident = ?7, secret = ?8, is_default = ?9, source_id = ?10, updated_at = ?11
                 WHERE id = ?1",
                params![
                    channel.id.to_string(),
                    channel.name,
                    channel.host,
                    channel.port,
                    channel.subchans,
                    channel.pubchans,
                    channel.ident,
                    channel.secret,
                    channel.is_default,
                    channel.source_id.map(|s| s.to_string()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::from_write(e, &channel.name))?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a channel by UUID.  Returns `true` if a row was deleted.
    pub fn delete_channel(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM channels WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Conversion failures caused by a stored value, as opposed to a failing
/// database.
pub(crate) fn is_invalid_value(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
    )
}

// The column is a plain INTEGER; anything outside u16 is rejected here.
fn port_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u16> {
    let raw: i64 = row.get(idx)?;
    u16::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

/// Map the [`CHANNEL_COLUMNS`] starting at `base` to a [`Channel`].
pub(crate) fn row_to_channel(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: uuid_at(row, base)?,
        owner_id: uuid_at(row, base + 1)?,
        name: row.get(base + 2)?,
        host: row.get(base + 3)?,
        port: port_at(row, base + 4)?,
        subchans: row.get(base + 5)?,
        pubchans: row.get(base + 6)?,
        ident: row.get(base + 7)?,
        secret: row.get(base + 8)?,
        is_default: row.get(base + 9)?,
        source_id: opt_uuid_at(row, base + 10)?,
        created_at: time_at(row, base + 11)?,
        updated_at: time_at(row, base + 12)?,
    })
}
