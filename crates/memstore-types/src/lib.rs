//! Shared domain types for memstore.
//!
//! Memory records, tag collections, filters, query options, the PostgreSQL
//! configuration value object and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod memory;
