//! Transport-agnostic feed client interface.
//!
//! The daemon only talks to brokers through these traits, so subscriber
//! workers and the publish drain can be exercised against in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use mazu_shared::types::FeedEndpoint;

use crate::error::FeedError;

/// A payload delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    /// Ident of the publisher.
    pub ident: String,
    pub topic: String,
    pub payload: Bytes,
}

/// What a subscribed connection can yield.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Message(FeedMessage),
    /// The broker reported an error (bad credentials, access denied...).
    Error(String),
}

/// One authenticated connection to a broker.
#[async_trait]
pub trait FeedConnection: Send {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), FeedError>;

    async fn publish(&mut self, topics: &[String], payload: &[u8]) -> Result<(), FeedError>;

    /// Block until the next event. Returns `FeedError::Closed` once the
    /// broker hangs up.
    async fn recv(&mut self) -> Result<FeedEvent, FeedError>;

    /// Wait up to `timeout` for the broker to reject a preceding publish.
    ///
    /// `Ok(None)` means no error arrived in time, which is how the protocol
    /// acknowledges a publish.
    async fn wait(&mut self, timeout: Duration) -> Result<Option<String>, FeedError>;

    async fn stop(&mut self) -> Result<(), FeedError>;
}

/// Opens connections. Shared by all workers, so it must be `Sync`.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self, endpoint: &FeedEndpoint) -> Result<Box<dyn FeedConnection>, FeedError>;
}
