use async_trait::async_trait;
use chrono::NaiveDate;
use lote_common::types::{ExtractionDate, Record};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::{RecordStore, StoreResult, Table};

/// [`RecordStore`] over the shared connection pool
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: i64,
    nome: String,
    status: Option<String>,
    data_prova: NaiveDate,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            id: row.id,
            nome: row.nome,
            status: row.status,
            data_prova: row.data_prova,
        }
    }
}

// i64 is what Postgres takes for OFFSET/LIMIT; page sizes never get near the edge
fn as_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn count_by_date(&self, date: ExtractionDate) -> StoreResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM concurso WHERE data_prova = $1")
            .bind(date.as_naive())
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn query_by_date(
        &self,
        date: ExtractionDate,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Record>> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT id, nome, status, data_prova
            FROM concurso
            WHERE data_prova = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(date.as_naive())
        .bind(as_i64(limit))
        .bind(as_i64(offset))
        .fetch_all(&self.pool)
        .await?;

        debug!(%date, offset, returned = rows.len(), "Fetched source page");
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn bulk_insert(&self, table: Table, rows: &[Record]) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (nome, status, data_prova) ",
            table.name()
        ));

        query_builder.push_values(rows, |mut b, record| {
            b.push_bind(&record.nome)
                .push_bind(&record.status)
                .push_bind(record.data_prova);
        });

        let result = query_builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self, table: Table) -> StoreResult<u64> {
        let result = sqlx::query(&format!("DELETE FROM {}", table.name()))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
