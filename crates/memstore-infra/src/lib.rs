//! Infrastructure layer for memstore.
//!
//! Implements the `MemoryDb` trait from `memstore-core` on PostgreSQL with
//! the pgvector extension, and provides the explicit [`logging::Logger`]
//! the storage components emit through.

pub mod logging;
pub mod postgres;
