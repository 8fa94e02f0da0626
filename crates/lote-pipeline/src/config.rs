//! Configuration management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::channel::PgChannelConfig;
use crate::db::DbConfig;

// ============================================================================
// Batch Configuration Constants
// ============================================================================

/// Prefix of the per-date topics (`concurso_<date>`).
pub const DEFAULT_TOPIC_PREFIX: &str = "concurso";

/// Topic rejected records are published to.
pub const DEFAULT_ERROR_TOPIC: &str = "concurso_erros";

/// Consumer group the consumer commits its position under.
pub const DEFAULT_CONSUMER_GROUP: &str = "lote-consumer";

/// Source rows fetched per page during extraction.
pub const DEFAULT_EXTRACT_PAGE_SIZE: u64 = 10_000;

/// Records per progress report during publishing.
pub const DEFAULT_PUBLISH_BATCH_SIZE: u64 = 10_000;

/// Rows per multi-row INSERT into the validated table.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1_000;

/// Upper bound on messages read by one consume invocation.
pub const DEFAULT_MAX_MESSAGES: u64 = 10_000_000;

/// Consumer progress is logged every this many messages.
pub const PROGRESS_EVERY: u64 = 10_000;

/// Upper bound on a single audit artifact write.
pub const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default root of the audit trail.
pub const DEFAULT_AUDIT_DIR: &str = "logs";

// ============================================================================

/// Knobs of the extract/consume protocol
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub topic_prefix: String,
    pub error_topic: String,
    pub consumer_group: String,
    pub extract_page_size: u64,
    pub publish_batch_size: u64,
    pub insert_batch_size: usize,
    pub max_messages: u64,
    pub extract_timeout: Option<Duration>,
    pub consume_timeout: Option<Duration>,
    pub audit_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            error_topic: DEFAULT_ERROR_TOPIC.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            extract_page_size: DEFAULT_EXTRACT_PAGE_SIZE,
            publish_batch_size: DEFAULT_PUBLISH_BATCH_SIZE,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            max_messages: DEFAULT_MAX_MESSAGES,
            extract_timeout: None,
            consume_timeout: None,
            audit_timeout: DEFAULT_AUDIT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditBackend {
    #[default]
    Fs,
    S3,
}

impl FromStr for AuditBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fs" | "file" | "local" => Ok(AuditBackend::Fs),
            "s3" => Ok(AuditBackend::S3),
            other => Err(anyhow::anyhow!("Invalid audit backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub backend: AuditBackend,
    /// Directory for `fs`, key prefix for `s3`
    pub dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::Fs,
            dir: PathBuf::from(DEFAULT_AUDIT_DIR),
        }
    }
}

/// Everything the `lote` binary needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database: DbConfig,
    pub batch: BatchConfig,
    pub channel: PgChannelConfig,
    pub audit: AuditConfig,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl PipelineConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = BatchConfig::default();
        let channel_defaults = PgChannelConfig::default();

        let config = PipelineConfig {
            database: DbConfig::from_env()?,
            batch: BatchConfig {
                topic_prefix: env_string("LOTE_TOPIC_PREFIX", DEFAULT_TOPIC_PREFIX),
                error_topic: env_string("LOTE_ERROR_TOPIC", DEFAULT_ERROR_TOPIC),
                consumer_group: env_string("LOTE_CONSUMER_GROUP", DEFAULT_CONSUMER_GROUP),
                extract_page_size: env_parse("LOTE_EXTRACT_PAGE_SIZE")
                    .unwrap_or(defaults.extract_page_size),
                publish_batch_size: env_parse("LOTE_PUBLISH_BATCH_SIZE")
                    .unwrap_or(defaults.publish_batch_size),
                insert_batch_size: env_parse("LOTE_INSERT_BATCH_SIZE")
                    .unwrap_or(defaults.insert_batch_size),
                max_messages: env_parse("LOTE_MAX_MESSAGES").unwrap_or(defaults.max_messages),
                extract_timeout: env_parse("LOTE_EXTRACT_TIMEOUT_SECS").map(Duration::from_secs),
                consume_timeout: env_parse("LOTE_CONSUME_TIMEOUT_SECS").map(Duration::from_secs),
                audit_timeout: env_parse("LOTE_AUDIT_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.audit_timeout),
            },
            channel: PgChannelConfig {
                poll_interval: env_parse("LOTE_CHANNEL_POLL_INTERVAL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(channel_defaults.poll_interval),
                idle_timeout: env_parse("LOTE_CHANNEL_IDLE_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(channel_defaults.idle_timeout),
                fetch_size: channel_defaults.fetch_size,
            },
            audit: AuditConfig {
                backend: match std::env::var("LOTE_AUDIT_BACKEND") {
                    Ok(raw) => raw.parse()?,
                    Err(_) => AuditBackend::Fs,
                },
                dir: PathBuf::from(env_string("LOTE_AUDIT_DIR", DEFAULT_AUDIT_DIR)),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        self.batch.validate()?;

        if self.channel.poll_interval.is_zero() {
            anyhow::bail!("LOTE_CHANNEL_POLL_INTERVAL_MS must be greater than 0");
        }

        Ok(())
    }
}

impl BatchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.topic_prefix.trim().is_empty() {
            anyhow::bail!("Topic prefix cannot be empty");
        }

        if self.error_topic.trim().is_empty() {
            anyhow::bail!("Error topic cannot be empty");
        }

        if self.consumer_group.trim().is_empty() {
            anyhow::bail!("Consumer group cannot be empty");
        }

        if self.extract_page_size == 0 || self.publish_batch_size == 0 {
            anyhow::bail!("Extract page size and publish batch size must be greater than 0");
        }

        // Postgres caps bind parameters at 65535 per statement, three per row
        if self.insert_batch_size == 0 || self.insert_batch_size > 21_845 {
            anyhow::bail!(
                "Insert batch size must be between 1 and 21845, got {}",
                self.insert_batch_size
            );
        }

        if self.max_messages == 0 {
            anyhow::bail!("Max messages must be greater than 0");
        }

        if self.audit_timeout.is_zero() {
            anyhow::bail!("Audit timeout must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "DATABASE_URL",
        "LOTE_TOPIC_PREFIX",
        "LOTE_INSERT_BATCH_SIZE",
        "LOTE_CONSUME_TIMEOUT_SECS",
        "LOTE_CHANNEL_POLL_INTERVAL_MS",
        "LOTE_AUDIT_BACKEND",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_batch_defaults() {
        let batch = BatchConfig::default();
        assert_eq!(batch.topic_prefix, "concurso");
        assert_eq!(batch.error_topic, "concurso_erros");
        assert_eq!(batch.extract_page_size, 10_000);
        assert_eq!(batch.insert_batch_size, 1_000);
        assert_eq!(batch.max_messages, 10_000_000);
        assert!(batch.consume_timeout.is_none());
        assert_eq!(batch.audit_timeout, Duration::from_secs(30));
        assert!(batch.validate().is_ok());

        let stalled = BatchConfig {
            audit_timeout: Duration::ZERO,
            ..BatchConfig::default()
        };
        assert!(stalled.validate().is_err());
    }

    #[test]
    fn test_insert_batch_bounds() {
        let mut batch = BatchConfig::default();
        batch.insert_batch_size = 0;
        assert!(batch.validate().is_err());
        batch.insert_batch_size = 30_000;
        assert!(batch.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        clear();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/lote_test");
        std::env::set_var("LOTE_TOPIC_PREFIX", "prova");
        std::env::set_var("LOTE_INSERT_BATCH_SIZE", "500");
        std::env::set_var("LOTE_CONSUME_TIMEOUT_SECS", "90");
        std::env::set_var("LOTE_AUDIT_BACKEND", "S3");

        let config = PipelineConfig::load().unwrap();
        assert_eq!(config.batch.topic_prefix, "prova");
        assert_eq!(config.batch.insert_batch_size, 500);
        assert_eq!(config.batch.consume_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.batch.extract_timeout, None);
        assert_eq!(config.audit.backend, AuditBackend::S3);

        clear();
    }

    #[test]
    #[serial]
    fn test_load_rejects_bad_values() {
        clear();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/lote_test");
        std::env::set_var("LOTE_CHANNEL_POLL_INTERVAL_MS", "0");
        assert!(PipelineConfig::load().is_err());

        std::env::remove_var("LOTE_CHANNEL_POLL_INTERVAL_MS");
        std::env::set_var("LOTE_AUDIT_BACKEND", "ftp");
        assert!(PipelineConfig::load().is_err());

        clear();
    }
}
