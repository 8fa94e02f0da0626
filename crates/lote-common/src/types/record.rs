use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LoteError;

/// Accepted candidate outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "aprovado", alias = "approved")]
    Approved,
    #[serde(rename = "reprovado", alias = "rejected")]
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Approved => "aprovado",
            Status::Rejected => "reprovado",
        }
    }
}

impl FromStr for Status {
    type Err = LoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aprovado" | "approved" => Ok(Status::Approved),
            "reprovado" | "rejected" => Ok(Status::Rejected),
            other => Err(LoteError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate row.
///
/// `status` stays raw text so that a bad value reaches the quarantine
/// artifact exactly as it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub nome: String,
    pub status: Option<String>,
    pub data_prova: NaiveDate,
}

impl Record {
    pub fn new(id: i64, nome: impl Into<String>, status: Option<Status>, data_prova: NaiveDate) -> Self {
        Self {
            id,
            nome: nome.into(),
            status: status.map(|s| s.as_str().to_string()),
            data_prova,
        }
    }

    /// Parsed status, `None` when absent or not one of the accepted values.
    pub fn status(&self) -> Option<Status> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn is_valid(&self) -> bool {
        self.status().is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
    }

    #[test]
    fn test_validity() {
        assert!(Record::new(1, "a", Some(Status::Approved), day()).is_valid());
        assert!(Record::new(2, "b", Some(Status::Rejected), day()).is_valid());
        assert!(!Record::new(3, "c", None, day()).is_valid());

        let mut odd = Record::new(4, "d", None, day());
        odd.status = Some("pendente".to_string());
        assert!(!odd.is_valid());

        odd.status = Some("approved".to_string());
        assert_eq!(odd.status(), Some(Status::Approved));

        // case matters
        odd.status = Some("APROVADO".to_string());
        assert!(!odd.is_valid());
    }

    #[test]
    fn test_record_json_shape() {
        let record = Record::new(7, "Candidato_7_2025-01-02", Some(Status::Rejected), day());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "nome": "Candidato_7_2025-01-02",
                "status": "reprovado",
                "data_prova": "2025-01-02"
            })
        );

        let missing: Record =
            serde_json::from_str(r#"{"id":1,"nome":"x","status":null,"data_prova":"2025-01-02"}"#).unwrap();
        assert_eq!(missing.status, None);
    }

    #[test]
    fn test_status_serde_aliases() {
        assert_eq!(serde_json::to_string(&Status::Approved).unwrap(), "\"aprovado\"");
        let parsed: Status = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(parsed, Status::Rejected);
        assert!("maybe".parse::<Status>().is_err());
    }
}
