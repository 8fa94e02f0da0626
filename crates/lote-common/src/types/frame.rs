//! Batch framing
//!
//! A batch travels on its date topic as one header, the records one message
//! each, then one footer. Every message is an [`Envelope`]: a JSON object
//! whose `kind` field says which of the three it is.
//!
//! ```text
//! {"kind":"header","lote":"concurso02012025_101500_ab12cd34","total_esperado":3,"inicio_envio":"2025-01-02"}
//! {"kind":"record","id":1,"nome":"Candidato_1_2025-01-02","status":"aprovado","data_prova":"2025-01-02"}
//! ...
//! {"kind":"footer","lote":"concurso02012025_101500_ab12cd34","total_processado":3,"fim_envio":"2025-01-02"}
//! ```

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{ExtractionDate, Record};
use crate::error::Result;

const STAMP_FORMAT: &str = "%d%m%Y_%H%M%S";

/// Batch identifier (`lote`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// `concurso<ddmmyyyy_HHMMSS>_<8 hex>`: sortable by minting time, safe in
    /// file names, unique across concurrent extractions of the same date.
    pub fn mint() -> Self {
        Self::mint_at(Local::now().naive_local())
    }

    pub fn mint_at(now: NaiveDateTime) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("concurso{}_{}", now.format(STAMP_FORMAT), &suffix[..8]))
    }

    /// Stand-in id for a frame that never produced a header.
    pub fn headerless() -> Self {
        Self::headerless_at(Local::now().naive_local())
    }

    pub fn headerless_at(now: NaiveDateTime) -> Self {
        Self(format!("sem_header_{}", now.format(STAMP_FORMAT)))
    }

    /// Id of the `index`-th record of this batch on the error topic.
    pub fn line_id(&self, index: usize) -> String {
        format!("{}_{}", self.0, index)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BatchId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchHeader {
    pub lote: BatchId,
    pub total_esperado: u64,
    pub inicio_envio: ExtractionDate,
}

impl BatchHeader {
    pub fn new(lote: impl Into<BatchId>, total_esperado: u64, date: ExtractionDate) -> Self {
        Self {
            lote: lote.into(),
            total_esperado,
            inicio_envio: date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFooter {
    pub lote: BatchId,
    pub total_processado: u64,
    pub fim_envio: ExtractionDate,
}

impl BatchFooter {
    pub fn new(lote: impl Into<BatchId>, total_processado: u64, date: ExtractionDate) -> Self {
        Self {
            lote: lote.into(),
            total_processado,
            fim_envio: date,
        }
    }
}

/// One message on a date topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    Header(BatchHeader),
    Record(Record),
    Footer(BatchFooter),
}

impl Envelope {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Header(_) => "header",
            Envelope::Record(_) => "record",
            Envelope::Footer(_) => "footer",
        }
    }
}
