//! Content-addressed sample storage.
//!
//! Each blob is stored under its sha256 hex digest with a `{digest}.json`
//! sidecar holding the string attributes it was stored with. Writes go to a
//! temporary file first and are moved into place, so concurrent writers of
//! the same content never expose a partial blob. Exactly one of them is told
//! it created the blob.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mazu_shared::constants::ATTR_SHA256;

use crate::error::ContentStoreError;

pub type Attributes = BTreeMap<String, String>;

/// Result of a [`ContentStore::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub sha256: String,
    /// `false` when the same bytes were already stored by someone else.
    pub created: bool,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `content` under its sha256 digest. Storing the same bytes twice
    /// is a no-op and reports `created: false`.
    async fn put(&self, content: &[u8], attributes: &Attributes) -> Result<StoredBlob, ContentStoreError>;

    /// Content of the first blob (by digest order) whose `attribute` equals
    /// `value`.
    async fn find(&self, attribute: &str, value: &str) -> Result<Option<Vec<u8>>, ContentStoreError>;

    async fn get(&self, sha256: &str) -> Result<Option<Vec<u8>>, ContentStoreError> {
        self.find(ATTR_SHA256, sha256).await
    }

    /// Remove every blob whose `attribute` equals `value`. Returns `false`
    /// when nothing matched.
    async fn delete(&self, attribute: &str, value: &str) -> Result<bool, ContentStoreError>;
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[derive(Debug, Clone)]
pub struct FsContentStore {
    base_path: PathBuf,
    max_size: usize,
}

impl FsContentStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ContentStoreError> {
        fs::create_dir_all(&base_path).await?;

        info!(path = %base_path.display(), "Content store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    // Digests become file names, so only accept exactly what sha256 hex
    // looks like.
    fn blob_path(&self, digest: &str) -> Result<PathBuf, ContentStoreError> {
        if !is_sha256_hex(digest) {
            return Err(ContentStoreError::InvalidDigest(digest.to_string()));
        }
        Ok(self.base_path.join(digest))
    }

    fn sidecar_path(&self, digest: &str) -> Result<PathBuf, ContentStoreError> {
        Ok(self.blob_path(digest)?.with_extension("json"))
    }

    async fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<(), ContentStoreError> {
        let tmp = self.base_path.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Publish `data` at `target` only if nothing is there yet. Returns
    /// `false` if another writer got there first.
    async fn write_exclusive(&self, target: &Path, data: &[u8]) -> Result<bool, ContentStoreError> {
        let tmp = self.base_path.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, data).await?;
        // A hard link fails instead of replacing an existing file.
        let linked = fs::hard_link(&tmp, target).await;
        let _ = fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, ContentStoreError> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Digests of every blob whose sidecar has `attribute == value`, sorted.
    async fn matching_digests(&self, attribute: &str, value: &str) -> Result<Vec<String>, ContentStoreError> {
        if attribute == ATTR_SHA256 {
            let path = match self.blob_path(value) {
                Ok(path) => path,
                Err(_) => return Ok(Vec::new()),
            };
            return Ok(if fs::try_exists(&path).await? {
                vec![value.to_string()]
            } else {
                Vec::new()
            });
        }

        let mut digests = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(digest) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
                .filter(|d| is_sha256_hex(d))
            else {
                continue;
            };

            let Some(raw) = Self::read_optional(&path).await? else {
                continue;
            };
            let attributes: Attributes = match serde_json::from_slice(&raw) {
                Ok(attributes) => attributes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable attribute sidecar");
                    continue;
                }
            };
            if attributes.get(attribute).map(String::as_str) == Some(value) {
                digests.push(digest.to_string());
            }
        }
        digests.sort();
        Ok(digests)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(&self, content: &[u8], attributes: &Attributes) -> Result<StoredBlob, ContentStoreError> {
        if content.is_empty() {
            return Err(ContentStoreError::Empty);
        }
        if content.len() > self.max_size {
            return Err(ContentStoreError::TooLarge {
                size: content.len(),
                max: self.max_size,
            });
        }

        let digest = hex::encode(Sha256::digest(content));
        let blob = self.blob_path(&digest)?;

        if fs::try_exists(&blob).await? {
            debug!(sha256 = %digest, "Blob already present");
            return Ok(StoredBlob {
                sha256: digest,
                created: false,
            });
        }

        let mut stored = attributes.clone();
        stored.insert(ATTR_SHA256.to_string(), digest.clone());
        let sidecar = serde_json::to_vec_pretty(&stored)
            .map_err(|e| ContentStoreError::Io(std::io::Error::new(ErrorKind::InvalidData, e)))?;

        self.write_atomic(&self.sidecar_path(&digest)?, &sidecar).await?;
        if !self.write_exclusive(&blob, content).await? {
            debug!(sha256 = %digest, "Blob stored concurrently by another writer");
            return Ok(StoredBlob {
                sha256: digest,
                created: false,
            });
        }

        debug!(sha256 = %digest, size = content.len(), "Stored blob");
        Ok(StoredBlob {
            sha256: digest,
            created: true,
        })
    }

    async fn find(&self, attribute: &str, value: &str) -> Result<Option<Vec<u8>>, ContentStoreError> {
        for digest in self.matching_digests(attribute, value).await? {
            if let Some(data) = Self::read_optional(&self.blob_path(&digest)?).await? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    async fn delete(&self, attribute: &str, value: &str) -> Result<bool, ContentStoreError> {
        let mut removed = false;
        for digest in self.matching_digests(attribute, value).await? {
            match fs::remove_file(self.blob_path(&digest)?).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            match fs::remove_file(self.sidecar_path(&digest)?).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            debug!(sha256 = %digest, "Deleted blob");
        }
        Ok(removed)
    }
}
