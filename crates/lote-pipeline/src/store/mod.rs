//! Record store
//!
//! Source rows live in `concurso`, accepted rows are copied into
//! `concurso_processado`. The pipeline only ever talks to the store through
//! [`RecordStore`], so the PostgreSQL implementation and the in-memory one
//! used by tests are interchangeable.

use async_trait::async_trait;
use lote_common::types::{ExtractionDate, Record};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgRecordStore;

/// Which table an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// `concurso`: rows waiting to be extracted
    Source,
    /// `concurso_processado`: rows from accepted batches
    Validated,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Source => "concurso",
            Table::Validated => "concurso_processado",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of source rows whose `data_prova` is `date`.
    async fn count_by_date(&self, date: ExtractionDate) -> StoreResult<u64>;

    /// One page of source rows for `date`, ordered by id.
    async fn query_by_date(
        &self,
        date: ExtractionDate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Record>>;

    /// Insert `rows` in a single statement. Row ids are assigned by the table.
    async fn bulk_insert(&self, table: Table, rows: &[Record]) -> StoreResult<u64>;

    /// Remove every row of `table`, returning how many were removed.
    async fn delete_all(&self, table: Table) -> StoreResult<u64>;
}
