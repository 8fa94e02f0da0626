//! Shared fixtures for pipeline integration tests
//!
//! Everything runs against the in-memory store, channel and audit sink, so
//! no database is needed.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::NaiveDate;
use lote_common::types::{BatchFooter, BatchHeader, Envelope, ExtractionDate, Record};
use lote_pipeline::audit::MemoryAuditSink;
use lote_pipeline::channel::MemoryChannel;
use lote_pipeline::config::BatchConfig;
use lote_pipeline::store::{MemoryStore, Table};
use lote_pipeline::Pipeline;
use std::sync::Arc;

pub const DATE: &str = "2025-01-02";
pub const TOPIC: &str = "concurso_2025-01-02";
pub const ERROR_TOPIC: &str = "concurso_erros";
pub const GROUP: &str = "lote-consumer";

pub fn date() -> ExtractionDate {
    DATE.parse().unwrap()
}

pub fn day() -> NaiveDate {
    date().as_naive()
}

/// Record with a raw status, so invalid values can be expressed.
pub fn record(id: i64, status: Option<&str>) -> Record {
    Record {
        id,
        nome: format!("Candidato_{id}_{DATE}"),
        status: status.map(str::to_string),
        data_prova: day(),
    }
}

pub fn header(lote: &str, total: u64) -> Envelope {
    Envelope::Header(BatchHeader::new(lote, total, date()))
}

pub fn footer(lote: &str, total: u64) -> Envelope {
    Envelope::Footer(BatchFooter::new(lote, total, date()))
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub channel: MemoryChannel,
    pub audit: Arc<MemoryAuditSink>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MemoryStore::new(), BatchConfig::default())
    }

    pub fn with_source(records: impl IntoIterator<Item = Record>) -> Self {
        Self::build(MemoryStore::with_records(records), BatchConfig::default())
    }

    pub fn build(store: MemoryStore, config: BatchConfig) -> Self {
        let store = Arc::new(store);
        let channel = MemoryChannel::new();
        let audit = Arc::new(MemoryAuditSink::new());
        let pipeline = Pipeline::new(store.clone(), Arc::new(channel.clone()), audit.clone(), config);
        Self {
            store,
            channel,
            audit,
            pipeline,
        }
    }

    pub fn push(&self, envelope: Envelope) {
        self.channel.push_raw(TOPIC, envelope.encode().unwrap());
    }

    pub fn push_record(&self, id: i64, status: Option<&str>) {
        self.push(Envelope::Record(record(id, status)));
    }

    /// Header, one record per status, footer (when `footer_total` is set).
    pub fn push_frame(&self, lote: &str, header_total: u64, statuses: &[Option<&str>], footer_total: Option<u64>) {
        self.push(header(lote, header_total));
        for (i, status) in statuses.iter().enumerate() {
            self.push_record(i as i64 + 1, *status);
        }
        if let Some(total) = footer_total {
            self.push(footer(lote, total));
        }
    }

    pub fn validated(&self) -> Vec<Record> {
        self.store.rows(Table::Validated)
    }

    pub fn poison_messages(&self) -> Vec<serde_json::Value> {
        self.channel
            .messages(ERROR_TOPIC)
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect()
    }

    /// Envelopes published to the date topic, decoded.
    pub fn published(&self) -> Vec<Envelope> {
        self.channel
            .messages(TOPIC)
            .iter()
            .map(|bytes| Envelope::decode(bytes).unwrap())
            .collect()
    }

    pub fn committed(&self) -> Option<u64> {
        self.channel.committed(TOPIC, GROUP)
    }

    /// JSON artifact under the test date whose file name starts with `prefix`.
    pub fn artifact(&self, prefix: &str) -> Option<serde_json::Value> {
        self.audit.find(prefix).and_then(|path| self.audit.json(&path))
    }

    pub fn artifact_count(&self, prefix: &str) -> usize {
        self.audit
            .paths()
            .iter()
            .filter(|p| p.rsplit('/').next().is_some_and(|name| name.starts_with(prefix)))
            .count()
    }
}
