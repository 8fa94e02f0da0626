//! PostgreSQL-backed durable log
//!
//! Every topic is a slice of `channel_messages` ordered by its `id` column;
//! consumer positions live in `channel_offsets`. A subscription polls for
//! new rows and reports end of stream once nothing has arrived for
//! `idle_timeout`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::{ChannelResult, Delivery, MessageChannel, Publisher, Subscription};

/// Default delay between polls of an exhausted topic.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Default quiet period after which a subscription reports end of stream.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10;

/// Default number of rows fetched per poll.
pub const DEFAULT_FETCH_SIZE: i64 = 1000;

#[derive(Debug, Clone)]
pub struct PgChannelConfig {
    pub poll_interval: Duration,
    pub idle_timeout: Duration,
    pub fetch_size: i64,
}

impl Default for PgChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

#[derive(Clone)]
pub struct PgChannel {
    pool: PgPool,
    config: PgChannelConfig,
}

impl PgChannel {
    pub fn new(pool: PgPool, config: PgChannelConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl MessageChannel for PgChannel {
    async fn publisher(&self, topic: &str) -> ChannelResult<Box<dyn Publisher>> {
        // fail here rather than on the first publish when the database is gone
        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(Box::new(PgPublisher {
            pool: self.pool.clone(),
            topic: topic.to_string(),
        }))
    }

    async fn subscribe(&self, topic: &str, group: &str) -> ChannelResult<Box<dyn Subscription>> {
        let committed: Option<(i64,)> = sqlx::query_as(
            "SELECT last_offset FROM channel_offsets WHERE topic = $1 AND consumer_group = $2",
        )
        .bind(topic)
        .bind(group)
        .fetch_optional(&self.pool)
        .await?;

        let cursor = committed.map(|(offset,)| offset).unwrap_or(0);
        debug!(topic, group, cursor, "Subscribed");

        Ok(Box::new(PgSubscription {
            pool: self.pool.clone(),
            config: self.config.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            cursor,
            buffer: VecDeque::new(),
        }))
    }
}

struct PgPublisher {
    pool: PgPool,
    topic: String,
}

#[async_trait]
impl Publisher for PgPublisher {
    async fn publish(&mut self, payload: &[u8]) -> ChannelResult<()> {
        sqlx::query("INSERT INTO channel_messages (topic, payload) VALUES ($1, $2)")
            .bind(&self.topic)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

struct PgSubscription {
    pool: PgPool,
    config: PgChannelConfig,
    topic: String,
    group: String,
    /// Highest message id already handed out
    cursor: i64,
    buffer: VecDeque<(i64, Vec<u8>)>,
}

impl PgSubscription {
    async fn fetch(&mut self) -> ChannelResult<()> {
        let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as(
            r#"
            SELECT id, payload
            FROM channel_messages
            WHERE topic = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "#,
        )
        .bind(&self.topic)
        .bind(self.cursor)
        .bind(self.config.fetch_size)
        .fetch_all(&self.pool)
        .await?;

        trace!(topic = %self.topic, fetched = rows.len(), "Polled channel");
        self.buffer.extend(rows);
        Ok(())
    }
}

#[async_trait]
impl Subscription for PgSubscription {
    async fn next(&mut self) -> ChannelResult<Option<Delivery>> {
        let idle_since = Instant::now();

        loop {
            if let Some((id, payload)) = self.buffer.pop_front() {
                self.cursor = id;
                return Ok(Some(Delivery {
                    offset: u64::try_from(id).unwrap_or(0),
                    payload,
                }));
            }

            self.fetch().await?;
            if !self.buffer.is_empty() {
                continue;
            }

            if idle_since.elapsed() >= self.config.idle_timeout {
                debug!(topic = %self.topic, "No new messages, end of stream");
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn commit(&mut self, offset: u64) -> ChannelResult<()> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        sqlx::query(
            r#"
            INSERT INTO channel_offsets (topic, consumer_group, last_offset, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (topic, consumer_group)
            DO UPDATE SET last_offset = GREATEST(channel_offsets.last_offset, EXCLUDED.last_offset),
                          updated_at = NOW()
            "#,
        )
        .bind(&self.topic)
        .bind(&self.group)
        .bind(offset)
        .execute(&self.pool)
        .await?;

        debug!(topic = %self.topic, group = %self.group, offset, "Committed offset");
        Ok(())
    }
}
