//! The ingest pipeline: fingerprint, dedup, store, catalogue, notify.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use mazu_shared::constants::{ATTR_FILETYPE, ATTR_SHA256};
use mazu_shared::DetectorRegistry;
use mazu_store::{Notification, Sample};

use crate::catalog::Catalog;
use crate::content_store::ContentStore;
use crate::dedup::{Admission, DedupGuard};
use crate::error::Result;

const NOTIFY_SUBJECT: &str = "You got a new sample";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { sha256: String, filetype: String },
    /// Already catalogued; nothing was written.
    Duplicate { sha256: String },
    /// Refused before hashing (empty or over the size limit).
    Rejected { reason: String },
}

pub struct IngestPipeline {
    catalog: Arc<dyn Catalog>,
    content: Arc<dyn ContentStore>,
    guard: DedupGuard,
    detectors: DetectorRegistry,
    notify: bool,
    max_size: usize,
}

impl IngestPipeline {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        content: Arc<dyn ContentStore>,
        detectors: DetectorRegistry,
        notify: bool,
        max_size: usize,
    ) -> Self {
        Self {
            guard: DedupGuard::new(catalog.clone()),
            catalog,
            content,
            detectors,
            notify,
            max_size,
        }
    }

    /// Run one payload through the pipeline on behalf of `owner`.
    ///
    /// Errors are store failures; the blob is removed again if the metadata
    /// record could not be written.
    pub async fn ingest(
        &self,
        payload: &[u8],
        owner: Option<Uuid>,
        source: Option<Uuid>,
    ) -> Result<IngestOutcome> {
        if payload.is_empty() {
            return Ok(IngestOutcome::Rejected {
                reason: "empty payload".to_string(),
            });
        }
        if payload.len() > self.max_size {
            return Ok(IngestOutcome::Rejected {
                reason: format!("payload of {} bytes exceeds {}", payload.len(), self.max_size),
            });
        }

        let digests = match self.guard.check(payload)? {
            Admission::Admit(digests) => digests,
            Admission::Reject(digests) => {
                debug!(sha256 = %digests.sha256, "Discarding known sample");
                return Ok(IngestOutcome::Duplicate {
                    sha256: digests.sha256,
                });
            }
        };

        let detection = self.detectors.detect(payload);
        let mut attributes = digests.attributes();
        attributes.insert(ATTR_FILETYPE.to_string(), detection.label.clone());

        let blob = self.content.put(payload, &attributes).await?;

        let sample = Sample::from_digests(&digests, detection.label.clone(), owner, source);
        if let Err(e) = self.catalog.create_sample(&sample) {
            if e.is_duplicate() {
                // Another writer catalogued the same bytes first; the blob is
                // theirs now.
                debug!(sha256 = %sample.sha256, "Lost dedup race");
                return Ok(IngestOutcome::Duplicate {
                    sha256: sample.sha256,
                });
            }
            // Only undo a write this call made; an existing blob may back a
            // record another writer is about to commit.
            if blob.created {
                warn!(sha256 = %sample.sha256, error = %e, "Cataloguing failed, removing blob");
                if let Err(cleanup) = self.content.delete(ATTR_SHA256, &sample.sha256).await {
                    warn!(sha256 = %sample.sha256, error = %cleanup, "Compensating delete failed");
                }
            } else {
                warn!(sha256 = %sample.sha256, error = %e, "Cataloguing failed, blob predates this ingest");
            }
            return Err(e);
        }

        info!(
            sha256 = %sample.sha256,
            filetype = %sample.filetype,
            detector = detection.detector,
            size = sample.size,
            "Stored sample"
        );

        if self.notify {
            if let Some(user_id) = owner {
                let notification =
                    Notification::new(user_id, NOTIFY_SUBJECT, format!("sample {}", sample.sha256));
                if let Err(e) = self.catalog.create_notification(&notification) {
                    warn!(sha256 = %sample.sha256, error = %e, "Failed to record notification");
                }
            }
        }

        Ok(IngestOutcome::Stored {
            sha256: sample.sha256,
            filetype: sample.filetype,
        })
    }

    /// Remove a sample's metadata and its blob. Returns `true` if either
    /// existed.
    #[cfg(test)]
    pub async fn delete_sample(&self, sha256: &str) -> Result<bool> {
        let had_record = self.catalog.delete_sample(sha256)?;
        let had_blob = self.content.delete(ATTR_SHA256, sha256).await?;
        if had_record || had_blob {
            info!(sha256, "Deleted sample");
        }
        Ok(had_record || had_blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use mazu_shared::identify;

    use crate::testing;

    #[tokio::test]
    async fn test_same_payload_twice_stores_once() {
        let harness = testing::Harness::new().await;
        let owner = harness.owner.id;

        let first = harness.pipeline.ingest(b"MZ\x90\x00dropper", Some(owner), None).await.unwrap();
        let second = harness.pipeline.ingest(b"MZ\x90\x00dropper", Some(owner), None).await.unwrap();

        let sha256 = identify(b"MZ\x90\x00dropper").sha256;
        assert_eq!(
            first,
            IngestOutcome::Stored {
                sha256: sha256.clone(),
                filetype: "MS-DOS executable".to_string(),
            }
        );
        assert_eq!(second, IngestOutcome::Duplicate { sha256: sha256.clone() });

        assert_eq!(harness.blob_count(), 1);
        let db = harness.db();
        assert_eq!(db.list_samples_for_user(owner).unwrap().len(), 1);
        // Only the stored one notifies.
        let notes = db.list_unread_notifications(owner).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].subject, NOTIFY_SUBJECT);
        assert!(notes[0].message.contains(&sha256));
    }

    #[tokio::test]
    async fn test_metadata_failure_removes_blob() {
        let harness = testing::Harness::new().await;
        harness.catalog.fail_create_sample.store(true, Ordering::SeqCst);

        let result = harness.pipeline.ingest(b"doomed payload", None, None).await;
        assert!(result.is_err());

        let sha256 = identify(b"doomed payload").sha256;
        assert_eq!(harness.content.get(&sha256).await.unwrap(), None);
        assert_eq!(harness.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_keeps_blob_written_by_another_writer() {
        let harness = testing::Harness::new().await;
        let payload = b"shared payload";
        let digests = identify(payload);

        // Another writer stored the blob and has not catalogued it yet.
        let first = harness.content.put(payload, &digests.attributes()).await.unwrap();
        assert!(first.created);

        harness.catalog.fail_create_sample.store(true, Ordering::SeqCst);
        assert!(harness.pipeline.ingest(payload, None, None).await.is_err());
        harness.catalog.fail_create_sample.store(false, Ordering::SeqCst);

        let sample = Sample::from_digests(&digests, "data".to_string(), None, None);
        harness.db().create_sample(&sample).unwrap();
        assert!(harness.db().sample_exists(&digests.sha256).unwrap());
        assert_eq!(harness.content.get(&digests.sha256).await.unwrap().unwrap(), payload);
    }

    #[tokio::test]
    async fn test_lost_race_keeps_winner_blob() {
        let harness = testing::Harness::new().await;
        harness.pipeline.ingest(b"raced payload", None, None).await.unwrap();

        // Pretend the pre-check ran before the winner committed.
        harness.catalog.hide_existing.store(true, Ordering::SeqCst);
        let outcome = harness.pipeline.ingest(b"raced payload", None, None).await.unwrap();

        let sha256 = identify(b"raced payload").sha256;
        assert_eq!(outcome, IngestOutcome::Duplicate { sha256: sha256.clone() });
        assert!(harness.content.get(&sha256).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized() {
        let harness = testing::Harness::builder().max_size(16).build().await;
        assert!(matches!(
            harness.pipeline.ingest(b"", None, None).await.unwrap(),
            IngestOutcome::Rejected { .. }
        ));
        assert!(matches!(
            harness.pipeline.ingest(&[0x41; 17], None, None).await.unwrap(),
            IngestOutcome::Rejected { .. }
        ));
        assert_eq!(harness.blob_count(), 0);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_ingest() {
        let harness = testing::Harness::new().await;
        let owner = harness.owner.id;
        harness.catalog.fail_notifications.store(true, Ordering::SeqCst);

        let outcome = harness.pipeline.ingest(b"hello\n", Some(owner), None).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Stored { ref filetype, .. } if filetype == "ASCII text"));

        let db = harness.db();
        assert_eq!(db.list_samples_for_user(owner).unwrap().len(), 1);
        assert!(db.list_unread_notifications(owner).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_can_be_disabled() {
        let harness = testing::Harness::builder().notify(false).build().await;
        let owner = harness.owner.id;

        harness.pipeline.ingest(b"quiet", Some(owner), None).await.unwrap();
        assert!(harness.db().list_unread_notifications(owner).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_sample_removes_both() {
        let harness = testing::Harness::new().await;
        harness.pipeline.ingest(b"to be deleted", None, None).await.unwrap();
        let sha256 = identify(b"to be deleted").sha256;

        assert!(harness.pipeline.delete_sample(&sha256).await.unwrap());
        assert!(!harness.db().sample_exists(&sha256).unwrap());
        assert_eq!(harness.content.get(&sha256).await.unwrap(), None);
        assert!(!harness.pipeline.delete_sample(&sha256).await.unwrap());
    }
}
