//! Single-row writes: upsert keyed on id, and delete.

use std::sync::Arc;

use chrono::Utc;
use memstore_core::index::db::cancellable;
use memstore_types::error::MemoryDbError;
use memstore_types::memory::{MemoryRecord, CONTENT_PAYLOAD_KEY};
use pgvector::Vector;
use sqlx::types::Json;
use tokio_util::sync::CancellationToken;

use super::pool::DatabasePool;
use super::schema::{QualifiedTable, TableSchema};
use crate::logging::Logger;

/// SQLSTATE `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Writes and deletes individual records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: DatabasePool,
    schema: Arc<TableSchema>,
    logger: Logger,
}

impl RecordStore {
    pub fn new(pool: DatabasePool, schema: Arc<TableSchema>, logger: Logger) -> Self {
        Self {
            pool,
            schema,
            logger,
        }
    }

    /// Insert or replace `record` in the table of a normalized index name.
    pub async fn upsert(
        &self,
        index: &str,
        record: &MemoryRecord,
        cancel: &CancellationToken,
    ) -> Result<String, MemoryDbError> {
        let table = self.schema.table(index)?;
        let sql = upsert_sql(&self.schema, &table);

        let mut payload = record.payload.clone();
        payload.remove(CONTENT_PAYLOAD_KEY);
        let last_update = record.last_update.unwrap_or_else(Utc::now);

        self.logger
            .attach(cancellable(cancel, async {
                let mut conn = self.pool.acquire().await?;
                sqlx::query(&sql)
                    .bind(&record.id)
                    .bind(Vector::from(record.embedding.clone()))
                    .bind(record.tags.to_key_value_list())
                    .bind(&record.content)
                    .bind(Json(serde_json::Value::Object(payload)))
                    .bind(last_update)
                    .execute(&mut *conn)
                    .await
                    .map_err(MemoryDbError::storage)?;
                tracing::debug!(db.collection.name = %table, id = %record.id, "upserted record");
                Ok::<_, MemoryDbError>(record.id.clone())
            }))
            .await
    }

    /// Delete a record. A missing table means there is nothing to delete.
    pub async fn delete(
        &self,
        index: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryDbError> {
        let table = self.schema.table(index)?;
        let sql = format!(
            "DELETE FROM {table} WHERE {} = $1",
            self.schema.columns().id
        );

        self.logger
            .attach(cancellable(cancel, async {
                let mut conn = self.pool.acquire().await?;
                match sqlx::query(&sql).bind(id).execute(&mut *conn).await {
                    Ok(result) => {
                        tracing::debug!(
                            db.collection.name = %table,
                            id,
                            rows = result.rows_affected(),
                            "deleted record"
                        );
                        Ok(())
                    }
                    Err(err) if is_undefined_table(&err) => {
                        tracing::debug!(db.collection.name = %table, id, "index table does not exist, nothing to delete");
                        Ok(())
                    }
                    Err(err) => Err(MemoryDbError::storage(err)),
                }
            }))
            .await
    }
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNDEFINED_TABLE),
        _ => false,
    }
}

fn upsert_sql(schema: &TableSchema, table: &QualifiedTable) -> String {
    let c = schema.columns();
    format!(
        "INSERT INTO {table} ({id}, {embedding}, {tags}, {content}, {payload}, {last_update}) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT ({id}) DO UPDATE SET \
         {embedding} = EXCLUDED.{embedding}, \
         {tags} = EXCLUDED.{tags}, \
         {content} = EXCLUDED.{content}, \
         {payload} = EXCLUDED.{payload}, \
         {last_update} = EXCLUDED.{last_update}",
        id = c.id,
        embedding = c.embedding,
        tags = c.tags,
        content = c.content,
        payload = c.payload,
        last_update = c.last_update,
    )
}
