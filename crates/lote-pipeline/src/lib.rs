//! Lote Pipeline Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Moves dated batches of candidate records from `concurso` into
//! `concurso_processado` through an ordered message channel. A batch is
//! accepted whole or quarantined whole.
//!
//! # Overview
//!
//! - **Extraction**: counts a date's rows, publishes header, records and
//!   footer to the date topic ([`extract`])
//! - **Consumption**: rebuilds the frame from the topic, validates it and
//!   routes it ([`consume`], [`validate`])
//! - **Outcomes**: bulk insert of accepted batches ([`sink`]), diagnostics
//!   and poison messages for rejected ones ([`quarantine`])
//! - **Collaborators**: [`store::RecordStore`], [`channel::MessageChannel`]
//!   and [`audit::AuditSink`], each with a PostgreSQL (or S3) implementation
//!   and an in-memory one
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lote_pipeline::{
//!     audit::MemoryAuditSink, channel::MemoryChannel, config::BatchConfig,
//!     store::MemoryStore, Pipeline,
//! };
//!
//! # async fn run() -> lote_pipeline::Result<()> {
//! let pipeline = Pipeline::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryChannel::new()),
//!     Arc::new(MemoryAuditSink::new()),
//!     BatchConfig::default(),
//! );
//! pipeline.extract("2025-01-02").await?;
//! let report = pipeline.consume("2025-01-02").await?;
//! println!("{} rows accepted", report.inserted);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cancel;
pub mod channel;
pub mod cli;
pub mod config;
pub mod consume;
pub mod db;
pub mod error;
pub mod extract;
pub mod quarantine;
pub mod seed;
pub mod service;
pub mod sink;
pub mod store;
pub mod validate;

pub use error::{Outcome, PipelineError, Result};
pub use service::Pipeline;
