use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// A value cannot be represented in the schema.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Map a write failure, turning UNIQUE / PRIMARY KEY violations into
    /// [`StoreError::Duplicate`].
    pub(crate) fn from_write(err: rusqlite::Error, what: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StoreError::Duplicate(what.to_string())
            }
            _ => StoreError::Sqlite(err),
        }
    }

    /// Map a single-row read, turning "no rows" into [`StoreError::NotFound`].
    pub(crate) fn from_read(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
