//! Audit artifact types
//!
//! Field names are the ones downstream tooling already reads from
//! `logs/<date>/`, so they stay in Portuguese.

use chrono::{DateTime, Local};
use lote_common::types::{BatchFooter, BatchHeader, BatchId, ExtractionDate, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::Write as _;
use std::time::Duration;

/// Render an elapsed time as `"<n>ms"`, `"<s.ss>s"` or `"<m>m<s.ss>s"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else if elapsed < Duration::from_secs(60) {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        let minutes = elapsed.as_secs() / 60;
        let seconds = elapsed.as_secs_f64() - (minutes * 60) as f64;
        format!("{minutes}m{seconds:.2}s")
    }
}

/// `extracao_<lote>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionLog {
    pub data: ExtractionDate,
    pub lote: BatchId,
    pub total_extraido: u64,
    pub tempo_execucao: String,
    pub timestamp: DateTime<Local>,
}

/// `kafka_carga_<lote>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadLog {
    pub header: BatchHeader,
    pub footer: BatchFooter,
    pub tempo_envio: String,
    pub timestamp: DateTime<Local>,
}

/// Final state of one `consume` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionStatus {
    Sucesso,
    SemRegistrosValidos,
    HeaderAusente,
    FooterAusente,
    ContagemDivergente,
    CommitParcial,
    FalhaBanco,
    Cancelado,
}

impl ConsumptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumptionStatus::Sucesso => "sucesso",
            ConsumptionStatus::SemRegistrosValidos => "sem_registros_validos",
            ConsumptionStatus::HeaderAusente => "header_ausente",
            ConsumptionStatus::FooterAusente => "footer_ausente",
            ConsumptionStatus::ContagemDivergente => "contagem_divergente",
            ConsumptionStatus::CommitParcial => "commit_parcial",
            ConsumptionStatus::FalhaBanco => "falha_banco",
            ConsumptionStatus::Cancelado => "cancelado",
        }
    }
}

impl std::fmt::Display for ConsumptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `consumo_<lote>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionLog {
    pub data: ExtractionDate,
    pub lote: BatchId,
    pub total_consumido: u64,
    pub tempo_processamento: String,
    pub status: ConsumptionStatus,
    pub timestamp: DateTime<Local>,
}

/// `lote_erro_<lote>.json`, written once per rejected batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineArtifact {
    pub data: ExtractionDate,
    pub lote: BatchId,
    pub motivo: String,
    pub total_registros: u64,
    pub registros_validos: u64,
    pub registros_invalidos: u64,
    pub registros_com_erro: Vec<Record>,
    pub timestamp: DateTime<Local>,
}

impl QuarantineArtifact {
    /// Sub-counts are recomputed from `records`, whatever the verdict said.
    pub fn new(date: ExtractionDate, lote: BatchId, motivo: impl Into<String>, records: Vec<Record>) -> Self {
        let valid = records.iter().filter(|r| r.is_valid()).count() as u64;
        let total = records.len() as u64;
        Self {
            data: date,
            lote,
            motivo: motivo.into(),
            total_registros: total,
            registros_validos: valid,
            registros_invalidos: total - valid,
            registros_com_erro: records,
            timestamp: Local::now(),
        }
    }
}

/// One rejected record on the error topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisonMessage {
    pub id_linha_kafka: String,
    pub payload: Record,
    pub motivo: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCategory {
    Banco,
    Kafka,
    Validacao,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Banco => "BANCO",
            ErrorCategory::Kafka => "KAFKA",
            ErrorCategory::Validacao => "VALIDACAO",
        }
    }
}

/// `erros_<categoria>_<timestamp>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLog {
    pub categoria: ErrorCategory,
    pub mensagem: String,
    pub error_trace: String,
    pub linha_erro: String,
    pub payload: JsonValue,
    pub timestamp: DateTime<Local>,
}

impl ErrorLog {
    /// Capture `err` with its whole source chain.
    pub fn capture<E>(categoria: ErrorCategory, mensagem: impl Into<String>, err: &E, payload: JsonValue) -> Self
    where
        E: std::error::Error + 'static,
    {
        let mut trace = format!("Error: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            let _ = write!(trace, "\nCaused by: {cause}");
            source = cause.source();
        }

        Self {
            categoria,
            mensagem: mensagem.into(),
            error_trace: trace,
            linha_erro: format!("{}: {}", std::any::type_name::<E>(), err),
            payload,
            timestamp: Local::now(),
        }
    }
}

/// Body of `ids_linha_kafka_<lote>.txt`
pub fn poison_id_list(
    date: ExtractionDate,
    lote: &BatchId,
    motivo: &str,
    ids: &[String],
    generated_at: DateTime<Local>,
) -> String {
    let mut out = String::with_capacity(128 + ids.len() * (lote.as_str().len() + 12));
    let _ = writeln!(out, "=== IDs LINHA KAFKA - {} ===", generated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Data: {date}");
    let _ = writeln!(out, "Lote: {lote}");
    let _ = writeln!(out, "Motivo: {motivo}");
    let _ = writeln!(out, "Total de IDs: {}", ids.len());
    out.push('\n');
    for (i, id) in ids.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, id);
    }
    out
}
