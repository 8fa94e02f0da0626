use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{AuditError, AuditResult, AuditSink};

/// Writes artifacts below a root directory (`logs/` by default)
#[derive(Debug, Clone)]
pub struct FsAuditSink {
    root: PathBuf,
}

impl FsAuditSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl AuditSink for FsAuditSink {
    async fn write_artifact(&self, path: &str, bytes: Vec<u8>) -> AuditResult<()> {
        let target = self.root.join(path);
        let io_err = |source| AuditError::Io {
            path: target.display().to_string(),
            source,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&target, bytes).await.map_err(io_err)?;

        debug!(path = %target.display(), "Wrote audit file");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_date_directories() {
        let dir = TempDir::new().unwrap();
        let sink = FsAuditSink::new(dir.path().join("logs"));

        sink.write_artifact("2025-01-02/consumo_L1.json", b"{}".to_vec())
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("logs/2025-01-02/consumo_L1.json")).unwrap();
        assert_eq!(written, b"{}");
    }

    #[tokio::test]
    async fn test_unwritable_root_reports_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let sink = FsAuditSink::new(&blocker);
        let err = sink.write_artifact("2025-01-02/a.json", vec![]).await.unwrap_err();
        assert!(matches!(err, AuditError::Io { .. }));
        assert!(err.to_string().contains("not-a-dir"));
    }
}
