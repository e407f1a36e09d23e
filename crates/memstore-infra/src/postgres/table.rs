//! Index table lifecycle: existence check, creation, enumeration, deletion.

use std::sync::Arc;

use futures_util::Stream;
use memstore_core::index::db::cancellable;
use memstore_types::config::{IndexDiscovery, TABLE_MARKER_COMMENT};
use memstore_types::error::MemoryDbError;
use sqlx::{PgConnection, Row};
use tokio_util::sync::CancellationToken;

use super::next_row;
use super::pool::DatabasePool;
use super::schema::{QualifiedTable, TableSchema};
use crate::logging::Logger;

const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
     WHERE table_schema = $1 AND table_name = $2)";

const LIST_TABLES_SQL: &str = "SELECT table_name::TEXT AS table_name FROM information_schema.tables \
     WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name";

const LIST_MARKED_TABLES_SQL: &str = "SELECT c.relname::TEXT AS table_name \
     FROM pg_catalog.pg_class c \
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname = $1 AND c.relkind IN ('r', 'p') \
     AND obj_description(c.oid, 'pg_class') = $2 \
     ORDER BY c.relname";

/// Creates, lists and drops index tables.
#[derive(Debug, Clone)]
pub struct TableManager {
    pool: DatabasePool,
    schema: Arc<TableSchema>,
    logger: Logger,
}

impl TableManager {
    pub fn new(pool: DatabasePool, schema: Arc<TableSchema>, logger: Logger) -> Self {
        Self {
            pool,
            schema,
            logger,
        }
    }

    /// Whether the table for a normalized index name exists.
    pub async fn exists(&self, index: &str, cancel: &CancellationToken) -> Result<bool, MemoryDbError> {
        let table = self.schema.table(index)?;
        self.logger
            .attach(cancellable(cancel, async {
                let mut conn = self.pool.acquire().await?;
                self.table_exists(&mut conn, &table).await
            }))
            .await
    }

    async fn table_exists(
        &self,
        conn: &mut PgConnection,
        table: &QualifiedTable,
    ) -> Result<bool, MemoryDbError> {
        sqlx::query_scalar::<_, bool>(TABLE_EXISTS_SQL)
            .bind(self.schema.schema_name())
            .bind(table.table.name())
            .fetch_one(conn)
            .await
            .map_err(MemoryDbError::storage)
    }

    /// Create the table unless it already exists.
    pub async fn create_index(
        &self,
        index: &str,
        vector_size: usize,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryDbError> {
        if vector_size == 0 {
            return Err(MemoryDbError::InvalidArgument(
                "vector size must be greater than zero".to_string(),
            ));
        }
        let table = self.schema.table(index)?;
        let ddl = self.schema.create_table_sql(&table, vector_size)?;

        self.logger
            .attach(cancellable(cancel, async {
                let mut conn = self.pool.acquire().await?;

                if self.table_exists(&mut conn, &table).await? {
                    tracing::debug!(db.collection.name = %table, "index table already exists");
                    return Ok(());
                }

                tracing::debug!(db.collection.name = %table, sql = %ddl, "creating index table");
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&ddl))
                    .await
                    .map_err(MemoryDbError::storage)?;

                tracing::info!(
                    db.collection.name = %table,
                    index,
                    vector_size,
                    "created index table"
                );
                Ok::<(), MemoryDbError>(())
            }))
            .await
    }

    /// Stream the names of index tables in the schema.
    pub fn list_indexes(
        &self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<String, MemoryDbError>> + Send + 'static {
        let pool = self.pool.clone();
        let schema = self.schema.clone();
        let logger = self.logger.clone();

        async_stream::try_stream! {
            let discovery = schema.discovery();
            let query = match discovery {
                IndexDiscovery::Prefix => sqlx::query(LIST_TABLES_SQL).bind(schema.schema_name()),
                IndexDiscovery::Comment => sqlx::query(LIST_MARKED_TABLES_SQL)
                    .bind(schema.schema_name())
                    .bind(TABLE_MARKER_COMMENT),
            };
            logger.scope(|| tracing::debug!(
                db.namespace = schema.schema_name(),
                ?discovery,
                "listing index tables"
            ));

            let mut conn = cancellable(&cancel, pool.acquire()).await?;
            let mut rows = query.fetch(&mut *conn);

            while let Some(row) = next_row(&mut rows, &cancel).await? {
                let table_name: String = row.try_get("table_name").map_err(MemoryDbError::storage)?;
                if let Some(index) = schema.index_name_from_table(&table_name) {
                    yield index;
                }
            }
        }
    }

    /// Drop the table. Missing tables are not an error.
    pub async fn delete_index(&self, index: &str, cancel: &CancellationToken) -> Result<(), MemoryDbError> {
        let table = self.schema.table(index)?;
        let sql = format!("DROP TABLE IF EXISTS {table}");

        self.logger
            .attach(cancellable(cancel, async {
                let mut conn = self.pool.acquire().await?;
                sqlx::query(&sql)
                    .execute(&mut *conn)
                    .await
                    .map_err(MemoryDbError::storage)?;
                tracing::info!(db.collection.name = %table, index, "dropped index table");
                Ok::<(), MemoryDbError>(())
            }))
            .await
    }
}
