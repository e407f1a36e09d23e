//! PostgreSQL implementation of [`MemoryDb`].

use std::sync::Arc;

use futures_util::Stream;
use memstore_core::index::db::MemoryDb;
use memstore_core::index::name::normalize_index_name;
use memstore_types::config::PostgresConfig;
use memstore_types::error::MemoryDbError;
use memstore_types::memory::{ListQuery, MemoryRecord, SimilarityQuery};
use tokio_util::sync::CancellationToken;

use super::pool::DatabasePool;
use super::record::RecordStore;
use super::schema::TableSchema;
use super::search::SearchEngine;
use super::table::TableManager;
use crate::logging::Logger;

/// Memory indexes stored as pgvector tables.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresMemory {
    pool: DatabasePool,
    tables: TableManager,
    records: RecordStore,
    search: SearchEngine,
}

impl PostgresMemory {
    /// Validate `config` and build a lazily connecting backend. No I/O.
    pub fn new(config: &PostgresConfig, logger: Logger) -> Result<Self, MemoryDbError> {
        let pool = DatabasePool::connect_lazy(config)?;
        Self::with_pool(config, pool, logger)
    }

    /// Validate `config` and open the pool before returning.
    pub async fn connect(config: &PostgresConfig, logger: Logger) -> Result<Self, MemoryDbError> {
        // Validate identifiers before touching the network.
        TableSchema::new(config)?;
        let pool = DatabasePool::connect(config).await?;
        Self::with_pool(config, pool, logger)
    }

    /// Build on an existing pool.
    pub fn with_pool(
        config: &PostgresConfig,
        pool: DatabasePool,
        logger: Logger,
    ) -> Result<Self, MemoryDbError> {
        let schema = Arc::new(TableSchema::new(config)?);
        logger.scope(|| {
            tracing::debug!(
                db.namespace = schema.schema_name(),
                prefix = schema.prefix(),
                "postgres memory backend ready"
            )
        });
        Ok(Self {
            tables: TableManager::new(pool.clone(), schema.clone(), logger.clone()),
            records: RecordStore::new(pool.clone(), schema.clone(), logger.clone()),
            search: SearchEngine::new(pool.clone(), schema, logger),
            pool,
        })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Whether the index's table exists.
    pub async fn index_exists(
        &self,
        index: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, MemoryDbError> {
        self.tables.exists(&normalize_index_name(index), cancel).await
    }
}

impl MemoryDb for PostgresMemory {
    async fn create_index(
        &self,
        index: &str,
        vector_size: usize,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryDbError> {
        self.tables
            .create_index(&normalize_index_name(index), vector_size, cancel)
            .await
    }

    fn get_indexes(
        &self,
        cancel: &CancellationToken,
    ) -> impl Stream<Item = Result<String, MemoryDbError>> + Send {
        self.tables.list_indexes(cancel.clone())
    }

    async fn delete_index(&self, index: &str, cancel: &CancellationToken) -> Result<(), MemoryDbError> {
        self.tables
            .delete_index(&normalize_index_name(index), cancel)
            .await
    }

    async fn upsert(
        &self,
        index: &str,
        record: &MemoryRecord,
        cancel: &CancellationToken,
    ) -> Result<String, MemoryDbError> {
        self.records
            .upsert(&normalize_index_name(index), record, cancel)
            .await
    }

    fn get_similar_list(
        &self,
        index: &str,
        embedding: &[f32],
        query: SimilarityQuery,
        cancel: &CancellationToken,
    ) -> impl Stream<Item = Result<(MemoryRecord, f64), MemoryDbError>> + Send {
        self.search.get_similar_list(
            normalize_index_name(index),
            embedding.to_vec(),
            query,
            cancel.clone(),
        )
    }

    fn get_list(
        &self,
        index: &str,
        query: ListQuery,
        cancel: &CancellationToken,
    ) -> impl Stream<Item = Result<MemoryRecord, MemoryDbError>> + Send {
        self.search
            .get_list(normalize_index_name(index), query, cancel.clone())
    }

    async fn delete(&self, index: &str, id: &str, cancel: &CancellationToken) -> Result<(), MemoryDbError> {
        self.records
            .delete(&normalize_index_name(index), id, cancel)
            .await
    }
}
