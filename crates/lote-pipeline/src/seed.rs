//! Synthetic source data
//!
//! Empties `concurso` and fills it with a deterministic candidate set: the
//! first day of the range carries rows without a status, so its batch gets
//! quarantined, every other day is fully valid.

use lote_common::types::{ExtractionDate, Record, Status};
use tracing::{debug, info, instrument};

use crate::cancel::Interrupt;
use crate::error::{PipelineError, Result};
use crate::store::{RecordStore, Table};

pub const DEFAULT_SEED_FROM: &str = "2025-01-01";
pub const DEFAULT_SEED_TO: &str = "2025-01-31";
pub const DEFAULT_FIRST_DAY_COUNT: u64 = 1_000;
pub const DEFAULT_PER_DAY_COUNT: u64 = 161_290;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPlan {
    pub from: ExtractionDate,
    pub to: ExtractionDate,
    pub first_day_count: u64,
    pub per_day_count: u64,
}

impl SeedPlan {
    /// January 2025 with the default volumes.
    pub fn january_2025() -> Result<Self> {
        Ok(Self {
            from: DEFAULT_SEED_FROM.parse()?,
            to: DEFAULT_SEED_TO.parse()?,
            first_day_count: DEFAULT_FIRST_DAY_COUNT,
            per_day_count: DEFAULT_PER_DAY_COUNT,
        })
    }

    pub fn expected_total(&self) -> u64 {
        let days = self.from.through(self.to).count() as u64;
        match days {
            0 => 0,
            n => self.first_day_count + (n - 1) * self.per_day_count,
        }
    }
}

/// Status of the `i`-th (1-based) candidate of a day.
fn status_for(first_day: bool, i: u64, count: u64) -> Option<Status> {
    if first_day {
        (i <= count * 9 / 10).then_some(Status::Approved)
    } else if i % 10 < 7 {
        Some(Status::Approved)
    } else {
        Some(Status::Rejected)
    }
}

#[instrument(skip(store, interrupt), fields(from = %plan.from, to = %plan.to))]
pub async fn seed(
    store: &dyn RecordStore,
    plan: SeedPlan,
    batch_size: usize,
    interrupt: &Interrupt,
) -> Result<u64> {
    if plan.to < plan.from {
        return Err(PipelineError::Config(format!(
            "Seed range is reversed: {} is after {}",
            plan.from, plan.to
        )));
    }

    let removed = interrupt.guard(store.delete_all(Table::Source)).await??;
    info!(removed, expected = plan.expected_total(), "Source table emptied, seeding");

    let batch_size = batch_size.max(1) as u64;
    let mut inserted = 0u64;

    for (day_index, date) in plan.from.through(plan.to).enumerate() {
        let first_day = day_index == 0;
        let count = if first_day {
            plan.first_day_count
        } else {
            plan.per_day_count
        };

        let mut start = 1u64;
        while start <= count {
            let end = (start + batch_size - 1).min(count);
            let rows: Vec<Record> = (start..=end)
                .map(|i| {
                    Record::new(
                        0,
                        format!("Candidato_{i}_{date}"),
                        status_for(first_day, i, count),
                        date.as_naive(),
                    )
                })
                .collect();

            inserted += interrupt.guard(store.bulk_insert(Table::Source, &rows)).await??;
            start = end + 1;
        }

        debug!(date = %date, count, inserted, "Day seeded");
    }

    info!(inserted, "Seeding complete");
    Ok(inserted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_distribution() {
        let first: Vec<_> = (1..=1000).map(|i| status_for(true, i, 1000)).collect();
        assert_eq!(first.iter().filter(|s| s.is_some()).count(), 900);
        assert!(first[899].is_some());
        assert!(first[900].is_none());

        let other: Vec<_> = (1..=100).map(|i| status_for(false, i, 100)).collect();
        assert_eq!(other.iter().filter(|s| **s == Some(Status::Approved)).count(), 70);
        assert!(other.iter().all(Option::is_some));
    }

    #[test]
    fn test_default_plan_total() {
        let plan = SeedPlan::january_2025().unwrap();
        assert_eq!(plan.expected_total(), 1_000 + 30 * 161_290);
    }
}
