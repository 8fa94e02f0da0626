//! Audit trail for extraction and consumption runs
//!
//! Every run leaves JSON (and one text) artifact under `<date>/` in the
//! configured [`AuditSink`]. Artifact writes are best effort: a failure or a
//! write outliving the auditor's timeout is logged as
//! [`PipelineError::AuditWriteFailed`] and the run carries on.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use lote_common::types::{BatchId, ExtractionDate};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DEFAULT_AUDIT_TIMEOUT;
use crate::error::PipelineError;

pub mod fs;
pub mod memory;
pub mod models;
pub mod s3;

pub use fs::FsAuditSink;
pub use memory::MemoryAuditSink;
pub use models::{
    format_elapsed, ConsumptionLog, ConsumptionStatus, ErrorCategory, ErrorLog, ExtractionLog,
    LoadLog, PoisonMessage, QuarantineArtifact,
};
pub use s3::{S3AuditConfig, S3AuditSink};

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {path}: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to upload {key}: {message}")]
    Upload { key: String, message: String },

    #[error("Audit storage unavailable: {0}")]
    Unavailable(String),

    #[error("Writing {path} timed out after {after:?}")]
    Timeout { path: String, after: Duration },
}

pub type AuditResult<T> = Result<T, AuditError>;

/// Durable storage for audit artifacts, addressed by relative path
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Store `bytes` at `path` (e.g. `2025-01-02/consumo_<lote>.json`).
    async fn write_artifact(&self, path: &str, bytes: Vec<u8>) -> AuditResult<()>;
}

/// Relative artifact paths, all under the extraction date
pub mod paths {
    use super::*;

    pub fn extraction(date: ExtractionDate, lote: &BatchId) -> String {
        format!("{date}/extracao_{lote}.json")
    }

    pub fn load(date: ExtractionDate, lote: &BatchId) -> String {
        format!("{date}/kafka_carga_{lote}.json")
    }

    pub fn consumption(date: ExtractionDate, lote: &BatchId) -> String {
        format!("{date}/consumo_{lote}.json")
    }

    pub fn quarantine(date: ExtractionDate, lote: &BatchId) -> String {
        format!("{date}/lote_erro_{lote}.json")
    }

    pub fn poison_ids(date: ExtractionDate, lote: &BatchId) -> String {
        format!("{date}/ids_linha_kafka_{lote}.txt")
    }

    /// `tag` keeps failures logged within the same millisecond apart.
    pub fn error(date: ExtractionDate, categoria: ErrorCategory, at: DateTime<Local>, tag: &str) -> String {
        format!(
            "{date}/erros_{}_{}_{tag}.json",
            categoria.as_str(),
            at.format("%Y%m%d_%H%M%S_%3f")
        )
    }
}

/// Typed front end over an [`AuditSink`]
#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl Auditor {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            timeout: DEFAULT_AUDIT_TIMEOUT,
        }
    }

    /// Bound every write. Writes are not tied to the invocation's interrupt,
    /// so a cancelled run still leaves its consumption log.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn store(&self, path: &str, bytes: Vec<u8>) -> AuditResult<()> {
        match tokio::time::timeout(self.timeout, self.sink.write_artifact(path, bytes)).await {
            Ok(result) => result,
            Err(_) => Err(AuditError::Timeout {
                path: path.to_string(),
                after: self.timeout,
            }),
        }
    }

    pub async fn write_json<T: Serialize + Sync>(&self, path: &str, value: &T) -> AuditResult<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| AuditError::Serialization {
            path: path.to_string(),
            source,
        })?;
        self.store(path, bytes).await
    }

    pub async fn write_text(&self, path: &str, text: String) -> AuditResult<()> {
        self.store(path, text.into_bytes()).await
    }

    /// Best-effort JSON artifact: returns whether it was written.
    pub async fn persist_json<T: Serialize + Sync>(&self, path: &str, value: &T) -> bool {
        settle(path, self.write_json(path, value).await)
    }

    /// Best-effort text artifact: returns whether it was written.
    pub async fn persist_text(&self, path: &str, text: String) -> bool {
        settle(path, self.write_text(path, text).await)
    }

    /// Best-effort `erros_<categoria>_*.json` describing `err`.
    pub async fn record_error<E>(
        &self,
        date: ExtractionDate,
        categoria: ErrorCategory,
        mensagem: &str,
        err: &E,
        payload: JsonValue,
    ) -> bool
    where
        E: std::error::Error + 'static,
    {
        let log = ErrorLog::capture(categoria, mensagem, err, payload);
        let tag = Uuid::new_v4().simple().to_string();
        let path = paths::error(date, categoria, log.timestamp, &tag[..8]);
        self.persist_json(&path, &log).await
    }
}

fn settle(path: &str, result: AuditResult<()>) -> bool {
    match result {
        Ok(()) => {
            debug!(path, "Audit artifact written");
            true
        },
        Err(source) => {
            let err = PipelineError::AuditWriteFailed(source);
            warn!(path, error = %err, "Audit artifact not written");
            false
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paths() {
        let date: ExtractionDate = "2025-01-02".parse().unwrap();
        let lote = BatchId::from("concurso02012025_101500_ab12cd34");

        assert_eq!(
            paths::extraction(date, &lote),
            "2025-01-02/extracao_concurso02012025_101500_ab12cd34.json"
        );
        assert_eq!(paths::load(date, &lote), "2025-01-02/kafka_carga_concurso02012025_101500_ab12cd34.json");
        assert_eq!(paths::consumption(date, &lote), "2025-01-02/consumo_concurso02012025_101500_ab12cd34.json");
        assert_eq!(paths::quarantine(date, &lote), "2025-01-02/lote_erro_concurso02012025_101500_ab12cd34.json");
        assert_eq!(paths::poison_ids(date, &lote), "2025-01-02/ids_linha_kafka_concurso02012025_101500_ab12cd34.txt");

        let at = Local.with_ymd_and_hms(2025, 1, 2, 10, 15, 0).single().unwrap();
        assert_eq!(
            paths::error(date, ErrorCategory::Kafka, at, "ab12cd34"),
            "2025-01-02/erros_KAFKA_20250102_101500_000_ab12cd34.json"
        );
    }

    #[tokio::test]
    async fn test_failed_writes_are_swallowed() {
        let sink = Arc::new(MemoryAuditSink::new());
        let auditor = Auditor::new(sink.clone());

        assert!(auditor.persist_text("2025-01-02/a.txt", "a".to_string()).await);
        sink.set_unavailable(true);
        assert!(!auditor.persist_text("2025-01-02/b.txt", "b".to_string()).await);
        assert_eq!(sink.paths(), vec!["2025-01-02/a.txt".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sink_times_out() {
        let sink = Arc::new(MemoryAuditSink::new());
        sink.set_stalled(true);
        let auditor = Auditor::new(sink.clone()).with_timeout(Duration::from_secs(5));

        let err = auditor
            .write_text("2025-01-02/a.txt", "a".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Timeout { .. }));
        assert!(!auditor.persist_json("2025-01-02/b.json", &serde_json::json!({})).await);

        sink.set_stalled(false);
        assert!(auditor.persist_text("2025-01-02/c.txt", "c".to_string()).await);
        assert_eq!(sink.paths(), vec!["2025-01-02/c.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_record_error_writes_categorized_artifact() {
        let sink = Arc::new(MemoryAuditSink::new());
        let auditor = Auditor::new(sink.clone());
        let date: ExtractionDate = "2025-01-02".parse().unwrap();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "broker gone");

        assert!(
            auditor
                .record_error(date, ErrorCategory::Kafka, "Erro ao enviar header", &err, serde_json::json!({"operacao": "enviar_header"}))
                .await
        );

        let paths = sink.paths();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with("2025-01-02/erros_KAFKA_"));
        let json = sink.json(&paths[0]).unwrap();
        assert_eq!(json["mensagem"], "Erro ao enviar header");
        assert_eq!(json["payload"]["operacao"], "enviar_header");
    }
}
