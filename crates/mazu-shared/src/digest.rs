//! Content fingerprints computed for every ingested sample.
//!
//! All cryptographic digests are fed from the same buffered payload in a
//! single pass; the fuzzy digest needs the total length up front and is
//! computed over the same buffer afterwards.

use std::collections::BTreeMap;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::constants::{
    ATTR_CRC32, ATTR_MD5, ATTR_SHA1, ATTR_SHA256, ATTR_SHA512, ATTR_SIZE, ATTR_SSDEEP,
    DIGEST_CHUNK_SIZE,
};
use crate::fuzzy;

/// The full fingerprint set of one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSet {
    pub md5: String,
    pub sha1: String,
    /// Primary digest, used as the dedup key.
    pub sha256: String,
    pub sha512: String,
    /// Context-triggered piecewise hash (`blocksize:hash:hash`).
    pub ssdeep: String,
    pub crc32: u32,
    pub size: u64,
}

impl DigestSet {
    pub fn primary(&self) -> &str {
        &self.sha256
    }

    /// Flatten into the string attributes stored next to a blob.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ATTR_MD5.to_string(), self.md5.clone()),
            (ATTR_SHA1.to_string(), self.sha1.clone()),
            (ATTR_SHA256.to_string(), self.sha256.clone()),
            (ATTR_SHA512.to_string(), self.sha512.clone()),
            (ATTR_SSDEEP.to_string(), self.ssdeep.clone()),
            (ATTR_CRC32.to_string(), self.crc32.to_string()),
            (ATTR_SIZE.to_string(), self.size.to_string()),
        ])
    }
}

/// Compute every configured digest over `buf`.
pub fn identify(buf: &[u8]) -> DigestSet {
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut sha512 = Sha512::new();
    let mut crc = crc32fast::Hasher::new();

    for chunk in buf.chunks(DIGEST_CHUNK_SIZE) {
        md5.update(chunk);
        sha1.update(chunk);
        sha256.update(chunk);
        sha512.update(chunk);
        crc.update(chunk);
    }

    DigestSet {
        md5: hex::encode(md5.finalize()),
        sha1: hex::encode(sha1.finalize()),
        sha256: hex::encode(sha256.finalize()),
        sha512: hex::encode(sha512.finalize()),
        ssdeep: fuzzy::fuzzy_hash(buf),
        crc32: crc.finalize(),
        size: buf.len() as u64,
    }
}
