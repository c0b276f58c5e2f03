/// Content store attribute holding the primary (dedup) digest.
pub const ATTR_SHA256: &str = "sha256";

pub const ATTR_MD5: &str = "md5";
pub const ATTR_SHA1: &str = "sha1";
pub const ATTR_SHA512: &str = "sha512";
pub const ATTR_SSDEEP: &str = "ssdeep";
pub const ATTR_CRC32: &str = "crc32";
pub const ATTR_SIZE: &str = "size";
pub const ATTR_FILETYPE: &str = "filetype";

/// Label used when no registered detector recognises a payload.
pub const FILETYPE_UNKNOWN: &str = "data";

/// Default hpfeeds broker port.
pub const DEFAULT_FEED_PORT: u16 = 10000;

/// Chunk size used when feeding a payload through the digest state.
pub const DIGEST_CHUNK_SIZE: usize = 64 * 1024;
