//! Ordered per-topic message channel
//!
//! Producers open a [`Publisher`] for one topic and append opaque payloads.
//! Consumers open a [`Subscription`] for a topic under a consumer group and
//! read payloads in publication order, starting after the group's last
//! committed offset. Delivery is at-least-once: anything read but not yet
//! committed is read again by the next subscription of the same group.
//!
//! Handles are created per invocation and dropped at its end.

use async_trait::async_trait;
use lote_common::types::ExtractionDate;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryChannel;
pub use postgres::{PgChannel, PgChannelConfig};

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },
}

impl ChannelError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// A message read from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Position in the topic; strictly increasing in read order
    pub offset: u64,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait Publisher: Send {
    async fn publish(&mut self, payload: &[u8]) -> ChannelResult<()>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Next message, or `None` once the topic has nothing more to offer.
    async fn next(&mut self) -> ChannelResult<Option<Delivery>>;

    /// Mark every message up to and including `offset` as handled for this group.
    async fn commit(&mut self, offset: u64) -> ChannelResult<()>;
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn publisher(&self, topic: &str) -> ChannelResult<Box<dyn Publisher>>;

    async fn subscribe(&self, topic: &str, group: &str) -> ChannelResult<Box<dyn Subscription>>;
}

/// `<prefix>_<YYYY-MM-DD>`
pub fn date_topic(prefix: &str, date: ExtractionDate) -> String {
    format!("{prefix}_{date}")
}
