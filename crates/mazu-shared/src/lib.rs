//! Domain types and content fingerprinting shared by every mazu crate.

pub mod constants;
pub mod digest;
pub mod filetype;
pub mod fuzzy;
pub mod types;

pub use digest::{identify, DigestSet};
pub use filetype::{DetectorRegistry, FileTypeDetector};
pub use types::{parse_topics, ChannelConfig, ChannelKey, FeedEndpoint};
