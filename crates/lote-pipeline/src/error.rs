//! Pipeline error type
//!
//! Connectivity failures (`StoreUnavailable`, `ChannelUnavailable`) abort the
//! run. Frame verdicts (`HeaderMissing` .. `InvalidRecordPresent`) are
//! returned after the batch has been quarantined. `AuditWriteFailed` never
//! escapes a run; it only shows up in logs.

use lote_common::types::{BatchId, ExtractionDate};
use lote_common::LoteError;
use thiserror::Error;

use crate::audit::AuditError;
use crate::channel::ChannelError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid date '{0}'. Use YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Message channel unavailable: {0}")]
    ChannelUnavailable(#[source] ChannelError),

    #[error("No records found for {date}")]
    NotFound { date: ExtractionDate },

    #[error("Load mismatch for batch {lote}: {expected} records counted, {sent} sent")]
    LoadMismatch { lote: BatchId, expected: u64, sent: u64 },

    #[error("Batch {lote} rejected: header not found")]
    HeaderMissing { lote: BatchId },

    #[error("Batch {lote} rejected: footer not found")]
    FooterMissing { lote: BatchId },

    #[error("Batch {lote} rejected: header expects {expected}, footer reports {declared}, {observed} received")]
    CountMismatch {
        lote: BatchId,
        expected: u64,
        declared: u64,
        observed: u64,
    },

    #[error("Batch {lote} rejected: {invalid} of {total} records have an invalid status")]
    InvalidRecordPresent { lote: BatchId, invalid: u64, total: u64 },

    #[error("Partial commit: only {committed} of {total} records inserted")]
    PartialCommit {
        committed: u64,
        total: u64,
        /// Store failure that stopped the insert; `None` when it was cancelled
        #[source]
        source: Option<StoreError>,
    },

    #[error("Audit write failed: {0}")]
    AuditWriteFailed(#[source] AuditError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// What a failed run left behind in the validated store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NothingAccepted,
    PartiallyAccepted,
}

impl Outcome {
    /// Process exit code the CLI reports this outcome with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::NothingAccepted => 1,
            Outcome::PartiallyAccepted => 3,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::NothingAccepted => f.write_str("nothing accepted"),
            Outcome::PartiallyAccepted => f.write_str("partially accepted"),
        }
    }
}

impl PipelineError {
    pub fn outcome(&self) -> Outcome {
        match self {
            PipelineError::PartialCommit { .. } => Outcome::PartiallyAccepted,
            _ => Outcome::NothingAccepted,
        }
    }

    /// True for the verdicts that reject a reconstructed batch.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::HeaderMissing { .. }
                | PipelineError::FooterMissing { .. }
                | PipelineError::CountMismatch { .. }
                | PipelineError::InvalidRecordPresent { .. }
        )
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::StoreUnavailable(err)
    }
}

impl From<ChannelError> for PipelineError {
    fn from(err: ChannelError) -> Self {
        PipelineError::ChannelUnavailable(err)
    }
}

impl From<LoteError> for PipelineError {
    fn from(err: LoteError) -> Self {
        match err {
            LoteError::InvalidDate(raw) => PipelineError::InvalidDate(raw),
            other => PipelineError::Config(other.to_string()),
        }
    }
}
