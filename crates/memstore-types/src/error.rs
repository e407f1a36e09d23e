use std::fmt;

use thiserror::Error;

/// Boxed driver error carried unchanged inside [`MemoryDbError::Storage`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while validating a [`PostgresConfig`](crate::config::PostgresConfig).
///
/// Always produced before any connection is attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("connection string is missing")]
    MissingConnectionString,

    #[error("table name prefix is missing")]
    MissingTableNamePrefix,

    #[error("column name for '{0}' is missing")]
    MissingColumn(&'static str),

    #[error("custom table SQL is missing the '{0}' placeholder")]
    MissingPlaceholder(&'static str),

    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("invalid pool size: need 0 < max_connections ({max}) and min_connections ({min}) <= max_connections")]
    InvalidPoolSize { min: u32, max: u32 },
}

/// The role of an identifier that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Schema,
    TablePrefix,
    Table,
    Field,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierKind::Schema => write!(f, "schema name"),
            IdentifierKind::TablePrefix => write!(f, "table name prefix"),
            IdentifierKind::Table => write!(f, "table name"),
            IdentifierKind::Field => write!(f, "field name"),
        }
    }
}

/// Errors from memory index operations (used by the `MemoryDb` trait in memstore-core).
#[derive(Debug, Error)]
pub enum MemoryDbError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("invalid {kind} '{value}': expected 1-63 characters of [a-zA-Z0-9_]")]
    InvalidIdentifier { kind: IdentifierKind, value: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[source] BoxError),

    #[error("operation cancelled")]
    Cancelled,
}

impl MemoryDbError {
    /// Wrap a driver error without altering it.
    pub fn storage(err: impl Into<BoxError>) -> Self {
        MemoryDbError::Storage(err.into())
    }
}
