//! Memory database trait.
//!
//! Defines the interface for index lifecycle, record writes and similarity
//! search. Implementations (e.g. PostgreSQL/pgvector) live in memstore-infra.

use std::future::Future;

use futures_util::Stream;
use memstore_types::error::MemoryDbError;
use memstore_types::memory::{ListQuery, MemoryRecord, SimilarityQuery};
use tokio_util::sync::CancellationToken;

/// Trait for vector-indexed record storage with filtered similarity search.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition). Every
/// operation takes a cancellation token; when it fires the in-flight call is
/// abandoned and [`MemoryDbError::Cancelled`] is returned. Streams are lazy,
/// finite and cannot be restarted.
pub trait MemoryDb: Send + Sync {
    /// Create the index if it does not exist. No-op when it does.
    fn create_index(
        &self,
        index: &str,
        vector_size: usize,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), MemoryDbError>> + Send;

    /// Stream the names of all indexes managed by this backend.
    fn get_indexes(
        &self,
        cancel: &CancellationToken,
    ) -> impl Stream<Item = Result<String, MemoryDbError>> + Send;

    /// Drop the index. Not an error when it does not exist.
    fn delete_index(
        &self,
        index: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), MemoryDbError>> + Send;

    /// Insert or replace a record keyed on its id. Returns the id.
    fn upsert(
        &self,
        index: &str,
        record: &MemoryRecord,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, MemoryDbError>> + Send;

    /// Stream records by descending similarity to `embedding`, with scores.
    fn get_similar_list(
        &self,
        index: &str,
        embedding: &[f32],
        query: SimilarityQuery,
        cancel: &CancellationToken,
    ) -> impl Stream<Item = Result<(MemoryRecord, f64), MemoryDbError>> + Send;

    /// Stream records matching the filters, without a distance computation.
    fn get_list(
        &self,
        index: &str,
        query: ListQuery,
        cancel: &CancellationToken,
    ) -> impl Stream<Item = Result<MemoryRecord, MemoryDbError>> + Send;

    /// Delete a record. Deleting from a missing index is not an error.
    fn delete(
        &self,
        index: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), MemoryDbError>> + Send;
}

/// Run `fut` unless `cancel` fires first.
///
/// Dropping the losing future aborts whatever database call it was awaiting.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, MemoryDbError>
where
    F: Future<Output = Result<T, MemoryDbError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MemoryDbError::Cancelled),
        result = fut => result,
    }
}
