use chrono::{Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::LoteError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar date a batch is extracted for. Only `YYYY-MM-DD` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtractionDate(NaiveDate);

impl ExtractionDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// Next calendar day, `None` past the end of chrono's range.
    pub fn succ(&self) -> Option<Self> {
        self.0.checked_add_days(Days::new(1)).map(Self)
    }

    /// Every day in `self..=to`; empty when `to` is before `self`.
    pub fn through(self, to: ExtractionDate) -> impl Iterator<Item = ExtractionDate> {
        std::iter::successors(Some(self), |d| d.succ()).take_while(move |d| *d <= to)
    }
}

impl From<NaiveDate> for ExtractionDate {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl FromStr for ExtractionDate {
    type Err = LoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // chrono tolerates unpadded fields ("2025-1-2"); the topic name must not vary
        if trimmed.len() != 10 {
            return Err(LoteError::InvalidDate(s.to_string()));
        }
        NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
            .map(Self)
            .map_err(|_| LoteError::InvalidDate(s.to_string()))
    }
}

impl fmt::Display for ExtractionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl Serialize for ExtractionDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExtractionDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_iso_dates() {
        let date: ExtractionDate = "2025-01-02".parse().unwrap();
        assert_eq!(date.as_naive(), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(date.to_string(), "2025-01-02");
    }

    #[test]
    fn test_rejects_malformed_dates() {
        for raw in ["", "2025-1-2", "02/01/2025", "2025-02-30", "2025-01-02T00:00:00", "hoje"] {
            let err = raw.parse::<ExtractionDate>().unwrap_err();
            assert!(matches!(err, LoteError::InvalidDate(_)), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_through_is_inclusive() {
        let from: ExtractionDate = "2025-02-27".parse().unwrap();
        let to: ExtractionDate = "2025-03-02".parse().unwrap();
        let days: Vec<String> = from.through(to).map(|d| d.to_string()).collect();
        assert_eq!(days, vec!["2025-02-27", "2025-02-28", "2025-03-01", "2025-03-02"]);

        assert_eq!(to.through(from).count(), 0);
        assert_eq!(from.through(from).count(), 1);
    }

    #[test]
    fn test_serde_uses_plain_string() {
        let date: ExtractionDate = "2025-01-02".parse().unwrap();
        assert_eq!(serde_json::to_string(&date).unwrap(), "\"2025-01-02\"");
        let back: ExtractionDate = serde_json::from_str("\"2025-01-02\"").unwrap();
        assert_eq!(back, date);
        assert!(serde_json::from_str::<ExtractionDate>("\"2025/01/02\"").is_err());
    }
}
