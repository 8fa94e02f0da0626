//! Caller-facing facade over the extractor, consumer and seeder

use lote_common::types::ExtractionDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditSink, Auditor};
use crate::cancel::Interrupt;
use crate::channel::MessageChannel;
use crate::config::BatchConfig;
use crate::consume::{ConsumeReport, Consumer};
use crate::error::{PipelineError, Result};
use crate::extract::{ExtractReport, Extractor};
use crate::seed::{self, SeedPlan};
use crate::store::RecordStore;

/// Every collaborator is injected; nothing is looked up globally.
///
/// Each invocation runs under a child of the shutdown token, so cancelling
/// the token stops every running invocation at its next blocking step.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn RecordStore>,
    channel: Arc<dyn MessageChannel>,
    auditor: Auditor,
    config: BatchConfig,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn MessageChannel>,
        audit: Arc<dyn AuditSink>,
        config: BatchConfig,
    ) -> Self {
        Self {
            store,
            channel,
            auditor: Auditor::new(audit).with_timeout(config.audit_timeout),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Zero sizes and empty topic names are refused before any I/O.
    fn checked_config(&self) -> Result<()> {
        self.config
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }

    fn interrupt(&self, timeout: Option<std::time::Duration>) -> Interrupt {
        Interrupt::new(self.shutdown.child_token(), timeout)
    }

    /// Publish the framed batch for `date`.
    pub async fn extract(&self, date: &str) -> Result<ExtractReport> {
        let date = parse_date(date)?;
        self.checked_config()?;
        Extractor {
            store: self.store.as_ref(),
            channel: self.channel.as_ref(),
            auditor: &self.auditor,
            config: &self.config,
        }
        .run(date, &self.interrupt(self.config.extract_timeout))
        .await
    }

    /// Reconstruct, validate and route the next batch on `date`'s topic.
    pub async fn consume(&self, date: &str) -> Result<ConsumeReport> {
        let date = parse_date(date)?;
        self.checked_config()?;
        Consumer {
            store: self.store.as_ref(),
            channel: self.channel.as_ref(),
            auditor: &self.auditor,
            config: &self.config,
        }
        .run(date, &self.interrupt(self.config.consume_timeout))
        .await
    }

    pub async fn seed(&self, plan: SeedPlan) -> Result<u64> {
        self.checked_config()?;
        seed::seed(
            self.store.as_ref(),
            plan,
            self.config.insert_batch_size,
            &self.interrupt(None),
        )
        .await
    }
}

fn parse_date(raw: &str) -> Result<ExtractionDate> {
    raw.parse::<ExtractionDate>()
        .map_err(|_| PipelineError::InvalidDate(raw.to_string()))
}
