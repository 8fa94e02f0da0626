use async_trait::async_trait;
use lote_common::types::{ExtractionDate, Record};
use std::sync::{Mutex, MutexGuard};

use super::{RecordStore, StoreError, StoreResult, Table};

#[derive(Default)]
struct Tables {
    source: Vec<Record>,
    validated: Vec<Record>,
    next_source_id: i64,
    next_validated_id: i64,
    unavailable: bool,
    /// Validated-table inserts left before they start failing
    inserts_before_failure: Option<usize>,
}

impl Tables {
    fn rows_mut(&mut self, table: Table) -> (&mut Vec<Record>, &mut i64) {
        match table {
            Table::Source => (&mut self.source, &mut self.next_source_id),
            Table::Validated => (&mut self.validated, &mut self.next_validated_id),
        }
    }
}

/// In-memory [`RecordStore`] for tests and dry runs.
///
/// Can be switched into an unavailable state, or told to fail validated
/// inserts after a number of successful ones.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with source rows, keeping their ids.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.lock();
            tables.source.extend(records);
            tables.next_source_id = tables.source.iter().map(|r| r.id).max().unwrap_or(0);
        }
        store
    }

    pub fn rows(&self, table: Table) -> Vec<Record> {
        let tables = self.lock();
        match table {
            Table::Source => tables.source.clone(),
            Table::Validated => tables.validated.clone(),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Let `successes` validated-table inserts through, then fail every one after.
    pub fn fail_validated_inserts_after(&self, successes: usize) {
        self.lock().inserts_before_failure = Some(successes);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // a poisoned lock only means another test thread panicked mid-assert
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(tables: &Tables) -> StoreResult<()> {
        if tables.unavailable {
            return Err(StoreError::unavailable("memory store switched off"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count_by_date(&self, date: ExtractionDate) -> StoreResult<u64> {
        let tables = self.lock();
        Self::check(&tables)?;
        Ok(tables
            .source
            .iter()
            .filter(|r| r.data_prova == date.as_naive())
            .count() as u64)
    }

    async fn query_by_date(
        &self,
        date: ExtractionDate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Record>> {
        let tables = self.lock();
        Self::check(&tables)?;
        let mut matching: Vec<&Record> = tables
            .source
            .iter()
            .filter(|r| r.data_prova == date.as_naive())
            .collect();
        matching.sort_by_key(|r| r.id);
        Ok(matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn bulk_insert(&self, table: Table, rows: &[Record]) -> StoreResult<u64> {
        let mut tables = self.lock();
        Self::check(&tables)?;

        if table == Table::Validated {
            match tables.inserts_before_failure {
                Some(0) => return Err(StoreError::unavailable("insert rejected")),
                Some(ref mut left) => *left -= 1,
                None => {},
            }
        }

        let (target, next_id) = tables.rows_mut(table);
        for row in rows {
            *next_id += 1;
            target.push(Record {
                id: *next_id,
                ..row.clone()
            });
        }
        Ok(rows.len() as u64)
    }

    async fn delete_all(&self, table: Table) -> StoreResult<u64> {
        let mut tables = self.lock();
        Self::check(&tables)?;
        let (target, _) = tables.rows_mut(table);
        let removed = target.len() as u64;
        target.clear();
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lote_common::types::Status;

    fn record(id: i64, date: &str) -> Record {
        let date: ExtractionDate = date.parse().unwrap();
        Record::new(id, format!("Candidato_{id}"), Some(Status::Approved), date.as_naive())
    }

    #[tokio::test]
    async fn test_pages_are_ordered_by_id() {
        let store = MemoryStore::with_records(vec![
            record(3, "2025-01-02"),
            record(1, "2025-01-02"),
            record(2, "2025-01-03"),
            record(5, "2025-01-02"),
        ]);
        let date = "2025-01-02".parse().unwrap();

        assert_eq!(store.count_by_date(date).await.unwrap(), 3);
        let first: Vec<i64> = store.query_by_date(date, 0, 2).await.unwrap().iter().map(|r| r.id).collect();
        let second: Vec<i64> = store.query_by_date(date, 2, 2).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(first, vec![1, 3]);
        assert_eq!(second, vec![5]);
    }

    #[tokio::test]
    async fn test_insert_failure_injection() {
        let store = MemoryStore::new();
        store.fail_validated_inserts_after(1);

        let rows = vec![record(1, "2025-01-02")];
        assert_eq!(store.bulk_insert(Table::Validated, &rows).await.unwrap(), 1);
        assert!(store.bulk_insert(Table::Validated, &rows).await.is_err());
        // source inserts are not affected
        assert_eq!(store.bulk_insert(Table::Source, &rows).await.unwrap(), 1);
        assert_eq!(store.rows(Table::Validated).len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryStore::with_records(vec![record(1, "2025-01-02")]);
        store.set_unavailable(true);
        assert!(store.count_by_date("2025-01-02".parse().unwrap()).await.is_err());
        store.set_unavailable(false);
        assert_eq!(store.delete_all(Table::Source).await.unwrap(), 1);
    }
}
