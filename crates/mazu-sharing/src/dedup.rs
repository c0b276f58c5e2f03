//! Admit-or-reject decision for incoming payloads.

use std::sync::Arc;

use mazu_shared::{identify, DigestSet};

use crate::catalog::Catalog;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Not seen before; go ahead and store it.
    Admit(DigestSet),
    /// A sample with the same sha256 is already catalogued.
    Reject(DigestSet),
}

/// Fingerprints payloads and checks the primary digest against the catalogue.
///
/// The check is advisory: two writers can both be admitted for the same
/// bytes. The catalogue's uniqueness constraint decides the winner.
pub struct DedupGuard {
    catalog: Arc<dyn Catalog>,
}

impl DedupGuard {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    pub fn exists(&self, sha256: &str) -> Result<bool> {
        self.catalog.sample_exists(sha256)
    }

    pub fn check(&self, content: &[u8]) -> Result<Admission> {
        let digests = identify(content);
        if self.exists(digests.primary())? {
            Ok(Admission::Reject(digests))
        } else {
            Ok(Admission::Admit(digests))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use mazu_store::{Database, Sample};

    #[test]
    fn test_admit_then_reject() {
        let catalog = Arc::new(SqliteCatalog::new(Database::open_in_memory().unwrap()));
        let guard = DedupGuard::new(catalog.clone());

        let digests = match guard.check(b"fresh payload").unwrap() {
            Admission::Admit(digests) => digests,
            other => panic!("expected admit, got {other:?}"),
        };
        catalog
            .create_sample(&Sample::from_digests(&digests, "ASCII text", None, None))
            .unwrap();

        assert!(guard.exists(&digests.sha256).unwrap());
        assert_eq!(
            guard.check(b"fresh payload").unwrap(),
            Admission::Reject(digests)
        );
    }
}
