//! PostgreSQL + pgvector storage layer.
//!
//! One table per memory index, named `<prefix><index>` inside a configured
//! schema. [`memory::PostgresMemory`] ties the components together behind the
//! `MemoryDb` trait.

pub mod filter;
pub mod identifier;
pub mod memory;
pub mod pool;
pub mod record;
pub mod schema;
pub mod search;
pub mod table;

use futures_util::{Stream, StreamExt};
use memstore_types::error::MemoryDbError;
use sqlx::postgres::PgRow;
use tokio_util::sync::CancellationToken;

/// Next row of a result stream, or `Cancelled` if the token fires first.
pub(crate) async fn next_row<S>(
    rows: &mut S,
    cancel: &CancellationToken,
) -> Result<Option<PgRow>, MemoryDbError>
where
    S: Stream<Item = Result<PgRow, sqlx::Error>> + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MemoryDbError::Cancelled),
        row = rows.next() => row.transpose().map_err(MemoryDbError::storage),
    }
}
