//! v001 -- Initial schema creation.
//!
//! Creates the catalogue tables: `users`, `sample_sources`, `channels`,
//! `samples` and `publish_queue`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    username   TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Sample sources (where a user's samples come from)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sample_sources (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    link       TEXT,
    descr      TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, name)
);

-- ----------------------------------------------------------------
-- Feed channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    id         TEXT PRIMARY KEY NOT NULL,
    owner_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    host       TEXT NOT NULL,
    port       INTEGER NOT NULL,
    subchans   TEXT NOT NULL DEFAULT '',   -- raw comma/space separated topics
    pubchans   TEXT NOT NULL DEFAULT '',
    ident      TEXT NOT NULL,
    secret     TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    source_id  TEXT REFERENCES sample_sources(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (owner_id, name)
);

-- ----------------------------------------------------------------
-- Samples (metadata only, content lives in the blob store)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS samples (
    id         TEXT PRIMARY KEY NOT NULL,
    md5        TEXT NOT NULL,
    sha1       TEXT NOT NULL,
    sha256     TEXT NOT NULL UNIQUE,
    sha512     TEXT NOT NULL,
    ssdeep     TEXT NOT NULL,
    crc32      INTEGER NOT NULL,
    filetype   TEXT NOT NULL,
    size       INTEGER NOT NULL,
    user_id    TEXT REFERENCES users(id) ON DELETE SET NULL,
    source_id  TEXT REFERENCES sample_sources(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_samples_user ON samples(user_id);

-- ----------------------------------------------------------------
-- Outbound publish queue
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS publish_queue (
    id         TEXT PRIMARY KEY NOT NULL,
    sample_id  TEXT NOT NULL REFERENCES samples(id) ON DELETE CASCADE,
    channel_id TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    published  INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_publish_queue_pending ON publish_queue(published);
"#;

/// Apply the initial schema.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
