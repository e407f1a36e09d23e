//! Identifier validation for dynamically built SQL.
//!
//! Schema, table and column names cannot be bound as parameters, so they are
//! interpolated into SQL text. The validators here are the only way to obtain
//! a [`QuotedIdentifier`], and the query builders only interpolate that type.

use std::fmt;

use memstore_types::error::{IdentifierKind, MemoryDbError};

/// PostgreSQL truncates identifiers longer than NAMEDATALEN - 1 bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated identifier. Displays double-quoted, ready for SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotedIdentifier(String);

impl QuotedIdentifier {
    /// The bare name, without quotes.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuotedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_IDENTIFIER_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn validate(kind: IdentifierKind, value: &str) -> Result<QuotedIdentifier, MemoryDbError> {
    if is_valid_identifier(value) {
        Ok(QuotedIdentifier(value.to_string()))
    } else {
        Err(MemoryDbError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}

pub fn validate_schema_name(value: &str) -> Result<QuotedIdentifier, MemoryDbError> {
    validate(IdentifierKind::Schema, value)
}

/// Prefixes are never used alone in SQL, but must be safe to concatenate.
pub fn validate_table_name_prefix(value: &str) -> Result<QuotedIdentifier, MemoryDbError> {
    validate(IdentifierKind::TablePrefix, value)
}

pub fn validate_table_name(value: &str) -> Result<QuotedIdentifier, MemoryDbError> {
    validate(IdentifierKind::Table, value)
}

pub fn validate_field_name(value: &str) -> Result<QuotedIdentifier, MemoryDbError> {
    validate(IdentifierKind::Field, value)
}
