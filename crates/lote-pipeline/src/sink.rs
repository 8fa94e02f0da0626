//! Bulk insert of accepted batches into `concurso_processado`

use lote_common::types::Record;
use tracing::{debug, error, info};

use crate::cancel::Interrupt;
use crate::error::{PipelineError, Result};
use crate::store::{RecordStore, Table};

/// Insert `records` in chunks of `batch_size`, one statement per chunk.
///
/// There is no enclosing transaction. A failure before any chunk lands is
/// reported as [`PipelineError::StoreUnavailable`]; a failure or cancellation
/// after that is [`PipelineError::PartialCommit`] with the number of rows that
/// made it.
pub async fn commit(
    store: &dyn RecordStore,
    records: &[Record],
    batch_size: usize,
    interrupt: &Interrupt,
) -> Result<u64> {
    let total = records.len() as u64;
    if records.is_empty() {
        debug!("Nothing to insert");
        return Ok(0);
    }

    let mut committed = 0u64;
    for (index, chunk) in records.chunks(batch_size.max(1)).enumerate() {
        let outcome = interrupt
            .guard(store.bulk_insert(Table::Validated, chunk))
            .await;

        match outcome {
            Ok(Ok(inserted)) => {
                committed += inserted;
                debug!(chunk = index + 1, inserted, committed, total, "Chunk inserted");
            },
            Ok(Err(e)) if committed == 0 => {
                error!(error = %e, "First insert failed, nothing committed");
                return Err(PipelineError::StoreUnavailable(e));
            },
            Ok(Err(e)) => {
                error!(error = %e, committed, total, "Insert failed after partial commit");
                return Err(PipelineError::PartialCommit {
                    committed,
                    total,
                    source: Some(e),
                });
            },
            Err(cancelled) if committed == 0 => return Err(cancelled),
            Err(_) => {
                return Err(PipelineError::PartialCommit {
                    committed,
                    total,
                    source: None,
                });
            },
        }
    }

    info!(inserted = committed, table = Table::Validated.name(), "Batch committed");
    Ok(committed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use lote_common::types::Status;
    use tokio_util::sync::CancellationToken;

    fn records(n: i64) -> Vec<Record> {
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        (1..=n)
            .map(|i| Record::new(i, format!("c{i}"), Some(Status::Approved), day))
            .collect()
    }

    #[tokio::test]
    async fn test_commits_in_chunks() {
        let store = MemoryStore::new();
        let inserted = commit(&store, &records(2500), 1000, &Interrupt::never()).await.unwrap();
        assert_eq!(inserted, 2500);
        assert_eq!(store.rows(Table::Validated).len(), 2500);
    }

    #[tokio::test]
    async fn test_empty_commit() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert_eq!(commit(&store, &[], 1000, &Interrupt::never()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_first_chunk_failure_is_unavailable() {
        let store = MemoryStore::new();
        store.fail_validated_inserts_after(0);
        let err = commit(&store, &records(10), 4, &Interrupt::never()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreUnavailable(_)));
        assert!(store.rows(Table::Validated).is_empty());
    }

    #[tokio::test]
    async fn test_later_failure_is_partial_commit() {
        let store = MemoryStore::new();
        store.fail_validated_inserts_after(2);
        let err = commit(&store, &records(2500), 1000, &Interrupt::never()).await.unwrap_err();
        match err {
            PipelineError::PartialCommit { committed, total, source } => {
                assert_eq!(committed, 2000);
                assert_eq!(total, 2500);
                assert!(source.is_some());
            },
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.rows(Table::Validated).len(), 2000);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_chunk() {
        let token = CancellationToken::new();
        token.cancel();
        let store = MemoryStore::new();
        let err = commit(&store, &records(3), 1000, &Interrupt::new(token, None)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
