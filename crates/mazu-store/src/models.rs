//! Domain model structs persisted in the catalogue database.
//!
//! Every struct derives `Serialize` and `Deserialize` so the web side can
//! read the same rows as JSON.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mazu_shared::DigestSet;

// ---------------------------------------------------------------------------
// User / SampleSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Where a user's samples come from (a honeypot network, a partner feed...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleSource {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub link: Option<String>,
    pub descr: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A feed channel row as edited by the operator.
///
/// Topic lists are kept as the raw text the operator typed; the daemon parses
/// them when it builds a registry snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Raw subscribe topics.
    pub subchans: String,
    /// Raw publish topics.
    pub pubchans: String,
    pub ident: String,
    pub secret: String,
    /// Newly ingested samples of the owner are queued to default channels.
    pub is_default: bool,
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// Metadata of one stored sample. The bytes live in the content store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sample {
    pub id: Uuid,
    pub md5: String,
    pub sha1: String,
    /// Primary digest; unique across the table.
    pub sha256: String,
    pub sha512: String,
    pub ssdeep: String,
    pub crc32: u32,
    pub filetype: String,
    pub size: u64,
    pub user_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Sample {
    /// Build a fresh record from a computed fingerprint set.
    pub fn from_digests(
        digests: &DigestSet,
        filetype: impl Into<String>,
        user_id: Option<Uuid>,
        source_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            md5: digests.md5.clone(),
            sha1: digests.sha1.clone(),
            sha256: digests.sha256.clone(),
            sha512: digests.sha512.clone(),
            ssdeep: digests.ssdeep.clone(),
            crc32: digests.crc32,
            filetype: filetype.into(),
            size: digests.size,
            user_id,
            source_id,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Publish queue
// ---------------------------------------------------------------------------

/// A request to push one sample to one channel's publish topics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishQueueEntry {
    pub id: Uuid,
    pub sample_id: Uuid,
    pub channel_id: Uuid,
    /// Terminal once `true`.
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An unpublished entry joined with everything the drain needs to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPublish {
    pub entry: PublishQueueEntry,
    pub sample_sha256: String,
    pub channel: Channel,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: Uuid, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            subject: subject.into(),
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Column conversion helpers
// ---------------------------------------------------------------------------

pub(crate) fn uuid_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn time_at(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
