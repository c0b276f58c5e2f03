use mazu_feed::FeedError;
use mazu_store::StoreError;
use thiserror::Error;

/// Failures of the on-disk sample store.
#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("Empty payload")]
    Empty,

    #[error("Payload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),

    #[error("Content store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SharingError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Content store error: {0}")]
    Content(#[from] ContentStoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Catalog lock poisoned")]
    CatalogPoisoned,
}

impl SharingError {
    /// The metadata store refused a sample because its digest is taken.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SharingError::Store(StoreError::Duplicate(_)))
    }
}

pub type Result<T> = std::result::Result<T, SharingError>;
