//! Feed client layer: the connection traits the daemon programs against and
//! an hpfeeds implementation over TCP.

pub mod client;
pub mod codec;
pub mod error;
pub mod hpfeeds;

pub use client::{FeedConnection, FeedConnector, FeedEvent, FeedMessage};
pub use codec::Frame;
pub use error::FeedError;
pub use hpfeeds::{HpfeedsConnection, HpfeedsConnector};
