use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{AuditError, AuditResult, AuditSink};

#[derive(Default)]
struct Artifacts {
    files: BTreeMap<String, Vec<u8>>,
    unavailable: bool,
    stalled: bool,
}

/// In-memory [`AuditSink`] for tests
#[derive(Default)]
pub struct MemoryAuditSink {
    inner: Mutex<Artifacts>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Artifacts> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every path written so far, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|bytes| String::from_utf8(bytes).ok())
    }

    pub fn json(&self, path: &str) -> Option<serde_json::Value> {
        self.get(path).and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    /// First path whose file name starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Option<String> {
        self.lock()
            .files
            .keys()
            .find(|path| path.rsplit('/').next().is_some_and(|name| name.starts_with(prefix)))
            .cloned()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// While stalled, writes never complete.
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write_artifact(&self, path: &str, bytes: Vec<u8>) -> AuditResult<()> {
        let stalled = self.lock().stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(AuditError::Unavailable("memory audit sink switched off".to_string()));
        }
        inner.files.insert(path.to_string(), bytes);
        Ok(())
    }
}
