//! Similarity search and filtered listing over an index table.
//!
//! The score is `1 - cosine distance` (pgvector `<=>`), so 1.0 means the same
//! direction and 0.0 orthogonal. Rows arrive ordered by descending score and
//! the engine stops at the first one under `min_relevance`; the threshold is
//! never left to the database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use memstore_core::index::db::cancellable;
use memstore_types::error::MemoryDbError;
use memstore_types::memory::{
    ListOrder, ListQuery, MemoryRecord, SimilarityQuery, SortColumn, SortDirection, TagCollection,
};
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tokio_util::sync::CancellationToken;

use super::filter::push_predicate;
use super::next_row;
use super::pool::DatabasePool;
use super::schema::{Columns, QualifiedTable, TableSchema};
use crate::logging::Logger;

/// Alias of the computed score column.
pub const SCORE_COLUMN: &str = "__score";

/// Builds and runs read queries against index tables.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    pool: DatabasePool,
    schema: Arc<TableSchema>,
    logger: Logger,
}

impl SearchEngine {
    pub fn new(pool: DatabasePool, schema: Arc<TableSchema>, logger: Logger) -> Self {
        Self {
            pool,
            schema,
            logger,
        }
    }

    /// Stream `(record, score)` pairs for a normalized index name, best first.
    pub fn get_similar_list(
        &self,
        index: String,
        embedding: Vec<f32>,
        query: SimilarityQuery,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<(MemoryRecord, f64), MemoryDbError>> + Send + 'static {
        let pool = self.pool.clone();
        let schema = self.schema.clone();
        let logger = self.logger.clone();

        async_stream::try_stream! {
            let table = schema.table(&index)?;
            let mut builder = build_similarity_query(&schema, &table, embedding, &query)?;
            logger.scope(|| tracing::debug!(
                db.collection.name = %table,
                sql = builder.sql(),
                min_relevance = query.min_relevance,
                "similarity search"
            ));

            let mut conn = cancellable(&cancel, pool.acquire()).await?;
            let mut rows = builder.build().fetch(&mut *conn);
            let columns = schema.columns();

            while let Some(row) = next_row(&mut rows, &cancel).await? {
                let score: f64 = row.try_get(SCORE_COLUMN).map_err(MemoryDbError::storage)?;
                match check_score(score, query.min_relevance) {
                    ScoreCheck::Keep => {}
                    ScoreCheck::Skip => {
                        logger.scope(|| tracing::debug!("skipping row with undefined score"));
                        continue;
                    }
                    ScoreCheck::Stop => {
                        logger.scope(|| tracing::debug!(score, "stopping at first row below threshold"));
                        break;
                    }
                }
                let record = record_from_row(&row, columns, query.with_embeddings)
                    .map_err(MemoryDbError::storage)?;
                yield (record, score);
            }
        }
    }

    /// Stream records matching the query's filters, in the requested order.
    pub fn get_list(
        &self,
        index: String,
        query: ListQuery,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<MemoryRecord, MemoryDbError>> + Send + 'static {
        let pool = self.pool.clone();
        let schema = self.schema.clone();
        let logger = self.logger.clone();

        async_stream::try_stream! {
            let table = schema.table(&index)?;
            let mut builder = build_list_query(&schema, &table, &query)?;
            logger.scope(|| tracing::debug!(
                db.collection.name = %table,
                sql = builder.sql(),
                "list records"
            ));

            let mut conn = cancellable(&cancel, pool.acquire()).await?;
            let mut rows = builder.build().fetch(&mut *conn);
            let columns = schema.columns();

            while let Some(row) = next_row(&mut rows, &cancel).await? {
                let record = record_from_row(&row, columns, query.with_embeddings)
                    .map_err(MemoryDbError::storage)?;
                yield record;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ScoreCheck {
    Keep,
    Skip,
    Stop,
}

/// Decide what to do with the next row of a descending-score stream.
///
/// NaN (a zero vector on either side of `<=>`) never qualifies. PostgreSQL
/// sorts it above every number, so it is skipped rather than ending the
/// stream ahead of real matches.
fn check_score(score: f64, min_relevance: f64) -> ScoreCheck {
    if score.is_nan() {
        ScoreCheck::Skip
    } else if score >= min_relevance {
        ScoreCheck::Keep
    } else {
        ScoreCheck::Stop
    }
}

/// Projected columns; the embedding only when requested.
fn push_projection(builder: &mut QueryBuilder<'static, Postgres>, columns: &Columns, with_embeddings: bool) {
    builder.push(format!(
        "{}, {}, {}, {}, {}",
        columns.id, columns.tags, columns.content, columns.payload, columns.last_update
    ));
    if with_embeddings {
        builder.push(format!(", {}", columns.embedding));
    }
}

fn push_pagination(builder: &mut QueryBuilder<'static, Postgres>, limit: Option<u32>, offset: u32) {
    if let Some(limit) = limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
    }
    if offset > 0 {
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(offset));
    }
}

/// `SELECT ..., 1 - (embedding <=> $1) AS "__score" ... ORDER BY "__score" DESC`.
pub fn build_similarity_query(
    schema: &TableSchema,
    table: &QualifiedTable,
    embedding: Vec<f32>,
    query: &SimilarityQuery,
) -> Result<QueryBuilder<'static, Postgres>, MemoryDbError> {
    if embedding.is_empty() {
        return Err(MemoryDbError::InvalidArgument(
            "query embedding is empty".to_string(),
        ));
    }
    let columns = schema.columns();

    let mut builder = QueryBuilder::new("SELECT ");
    push_projection(&mut builder, columns, query.with_embeddings);
    builder.push(format!(", 1 - ({} <=> ", columns.embedding));
    builder.push_bind(Vector::from(embedding));
    builder.push(format!(") AS \"{SCORE_COLUMN}\" FROM {table} WHERE "));
    push_predicate(&mut builder, &columns.tags, &query.filters)?;
    builder.push(format!(" ORDER BY \"{SCORE_COLUMN}\" DESC"));
    push_pagination(&mut builder, query.limit, query.offset);

    Ok(builder)
}

/// `SELECT ... WHERE <filters> ORDER BY <column> <direction>`.
pub fn build_list_query(
    schema: &TableSchema,
    table: &QualifiedTable,
    query: &ListQuery,
) -> Result<QueryBuilder<'static, Postgres>, MemoryDbError> {
    let columns = schema.columns();
    let order = query.order.unwrap_or_default();

    let mut builder = QueryBuilder::new("SELECT ");
    push_projection(&mut builder, columns, query.with_embeddings);
    builder.push(format!(" FROM {table} WHERE "));
    push_predicate(&mut builder, &columns.tags, &query.filters)?;
    builder.push(format!(" ORDER BY {}", order_by(columns, order)));
    push_pagination(&mut builder, query.limit, query.offset);

    Ok(builder)
}

fn order_by(columns: &Columns, order: ListOrder) -> String {
    let column = match order.column {
        SortColumn::Id => &columns.id,
        SortColumn::Content => &columns.content,
        SortColumn::LastUpdate => &columns.last_update,
    };
    let direction = match order.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    // Tie-break on id so pages are stable.
    if order.column == SortColumn::Id {
        format!("{column} {direction}")
    } else {
        format!("{column} {direction}, {} ASC", columns.id)
    }
}

/// Map a projected row back to a record.
pub fn record_from_row(
    row: &PgRow,
    columns: &Columns,
    with_embeddings: bool,
) -> Result<MemoryRecord, sqlx::Error> {
    let id: String = row.try_get(columns.id.name())?;
    let tags: Option<Vec<String>> = row.try_get(columns.tags.name())?;
    let content: Option<String> = row.try_get(columns.content.name())?;
    let payload: Option<Json<serde_json::Value>> = row.try_get(columns.payload.name())?;
    let last_update: Option<DateTime<Utc>> = row.try_get(columns.last_update.name())?;

    let embedding = if with_embeddings {
        let vector: Option<Vector> = row.try_get(columns.embedding.name())?;
        vector.map(|v| v.to_vec()).unwrap_or_default()
    } else {
        Vec::new()
    };

    let payload = match payload.map(|Json(value)| value) {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };

    Ok(MemoryRecord {
        id,
        embedding,
        tags: TagCollection::from_key_value_list(tags.unwrap_or_default()),
        content: content.unwrap_or_default(),
        payload,
        last_update,
    })
}
