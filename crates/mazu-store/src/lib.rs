//! # mazu-store
//!
//! Metadata store for the sample catalogue, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for the channel
//! registry, samples, the outbound publish queue and user notifications.

pub mod channels;
pub mod database;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod publish_queue;
pub mod samples;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
