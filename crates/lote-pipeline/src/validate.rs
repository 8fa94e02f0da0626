//! Batch validation
//!
//! [`validate`] is a pure function of the reconstructed frame. Checks run in
//! a fixed order and the first failing one decides the verdict.

use lote_common::types::BatchId;

use crate::audit::ConsumptionStatus;
use crate::consume::Frame;
use crate::error::PipelineError;

pub const MOTIVO_HEADER_MISSING: &str = "Header não encontrado";
pub const MOTIVO_FOOTER_MISSING: &str = "Footer não encontrado";
pub const MOTIVO_INVALID_STATUS: &str =
    "Lote rejeitado - Status inválido encontrado (NULL ou diferente de aprovado/reprovado)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    HeaderMissing,
    FooterMissing,
    CountMismatch {
        /// header `total_esperado`
        expected: u64,
        /// footer `total_processado`
        declared: u64,
        /// records actually received inside the frame
        observed: u64,
    },
    InvalidRecordPresent {
        invalid: u64,
        total: u64,
    },
    Accepted,
}

impl Verdict {
    /// Human-readable reason recorded in quarantine artifacts.
    pub fn motivo(&self) -> String {
        match self {
            Verdict::HeaderMissing => MOTIVO_HEADER_MISSING.to_string(),
            Verdict::FooterMissing => MOTIVO_FOOTER_MISSING.to_string(),
            Verdict::CountMismatch {
                expected, declared, ..
            } if expected != declared => {
                format!("Total esperado ({expected}) diferente do processado ({declared})")
            },
            Verdict::CountMismatch {
                declared, observed, ..
            } => format!("Total processado ({declared}) diferente do recebido ({observed})"),
            Verdict::InvalidRecordPresent { .. } => MOTIVO_INVALID_STATUS.to_string(),
            Verdict::Accepted => "Lote aceito".to_string(),
        }
    }

    pub fn consumption_status(&self) -> ConsumptionStatus {
        match self {
            Verdict::HeaderMissing => ConsumptionStatus::HeaderAusente,
            Verdict::FooterMissing => ConsumptionStatus::FooterAusente,
            Verdict::CountMismatch { .. } => ConsumptionStatus::ContagemDivergente,
            Verdict::InvalidRecordPresent { .. } => ConsumptionStatus::SemRegistrosValidos,
            Verdict::Accepted => ConsumptionStatus::Sucesso,
        }
    }

    /// The error a rejected batch is reported with; `None` when accepted.
    pub fn into_error(self, lote: BatchId) -> Option<PipelineError> {
        match self {
            Verdict::HeaderMissing => Some(PipelineError::HeaderMissing { lote }),
            Verdict::FooterMissing => Some(PipelineError::FooterMissing { lote }),
            Verdict::CountMismatch {
                expected,
                declared,
                observed,
            } => Some(PipelineError::CountMismatch {
                lote,
                expected,
                declared,
                observed,
            }),
            Verdict::InvalidRecordPresent { invalid, total } => {
                Some(PipelineError::InvalidRecordPresent { lote, invalid, total })
            },
            Verdict::Accepted => None,
        }
    }
}

pub fn validate(frame: &Frame) -> Verdict {
    let Some(header) = frame.header.as_ref() else {
        return Verdict::HeaderMissing;
    };

    let Some(footer) = frame.footer.as_ref().filter(|f| f.lote == header.lote) else {
        return Verdict::FooterMissing;
    };

    let observed = frame.records.len() as u64;
    if header.total_esperado != footer.total_processado || footer.total_processado != observed {
        return Verdict::CountMismatch {
            expected: header.total_esperado,
            declared: footer.total_processado,
            observed,
        };
    }

    if frame.all_valid {
        return Verdict::Accepted;
    }

    Verdict::InvalidRecordPresent {
        invalid: frame.records.iter().filter(|r| !r.is_valid()).count() as u64,
        total: observed,
    }
}
