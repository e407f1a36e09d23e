//! Connection and schema configuration for the PostgreSQL memory backend.
//!
//! `PostgresConfig` is a resolved value object: loading it from a file or the
//! environment is the caller's job. [`PostgresConfig::validate`] runs before
//! any connection is opened.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder for the quoted, schema-qualified table reference in custom DDL.
pub const TABLE_NAME_PLACEHOLDER: &str = "%%table_name%%";

/// Placeholder for the vector dimensionality in custom DDL.
pub const VECTOR_SIZE_PLACEHOLDER: &str = "%%vector_size%%";

/// Comment attached to index tables, used by [`IndexDiscovery::Comment`].
pub const TABLE_MARKER_COMMENT: &str = "memstore:memory-index";

/// How `get_indexes` tells index tables apart from other tables in the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDiscovery {
    /// Tables whose name starts with the configured prefix (case-insensitive).
    #[default]
    Prefix,
    /// Tables carrying [`TABLE_MARKER_COMMENT`].
    Comment,
}

/// Physical column names for the logical record fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    #[serde(default = "default_id_column")]
    pub id: String,
    #[serde(default = "default_embedding_column")]
    pub embedding: String,
    #[serde(default = "default_tags_column")]
    pub tags: String,
    #[serde(default = "default_content_column")]
    pub content: String,
    #[serde(default = "default_payload_column")]
    pub payload: String,
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_embedding_column() -> String {
    "embedding".to_string()
}

fn default_tags_column() -> String {
    "tags".to_string()
}

fn default_content_column() -> String {
    "content".to_string()
}

fn default_payload_column() -> String {
    "payload".to_string()
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            id: default_id_column(),
            embedding: default_embedding_column(),
            tags: default_tags_column(),
            content: default_content_column(),
            payload: default_payload_column(),
        }
    }
}

/// Configuration for the PostgreSQL/pgvector memory backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `postgres://` connection URL.
    #[serde(default)]
    pub connection_string: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    /// Prepended to every index name to form the table name.
    #[serde(default = "default_table_name_prefix")]
    pub table_name_prefix: String,

    #[serde(default)]
    pub columns: ColumnNames,

    /// Optional custom `CREATE TABLE` statement, one line per entry.
    ///
    /// Must contain both [`TABLE_NAME_PLACEHOLDER`] and [`VECTOR_SIZE_PLACEHOLDER`].
    #[serde(default)]
    pub create_table_sql: Option<Vec<String>>,

    #[serde(default)]
    pub index_discovery: IndexDiscovery,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub min_connections: u32,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_table_name_prefix() -> String {
    "km_".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl PostgresConfig {
    /// Config with defaults for everything but the connection string.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            schema: default_schema(),
            table_name_prefix: default_table_name_prefix(),
            columns: ColumnNames::default(),
            create_table_sql: None,
            index_discovery: IndexDiscovery::default(),
            max_connections: default_max_connections(),
            min_connections: 0,
        }
    }

    /// The custom DDL template joined into a single statement batch, if configured.
    pub fn custom_table_sql(&self) -> Option<String> {
        self.create_table_sql.as_ref().map(|lines| lines.join("\n"))
    }

    /// Check required fields and the custom DDL template.
    ///
    /// Identifier character rules, the URL syntax and pool bounds are
    /// enforced separately when the schema model and pool are built, also
    /// before any I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::MissingConnectionString);
        }

        if self.table_name_prefix.trim().is_empty() {
            return Err(ConfigError::MissingTableNamePrefix);
        }

        let columns = [
            ("id", &self.columns.id),
            ("embedding", &self.columns.embedding),
            ("tags", &self.columns.tags),
            ("content", &self.columns.content),
            ("payload", &self.columns.payload),
        ];
        for (logical, physical) in columns {
            if physical.trim().is_empty() {
                return Err(ConfigError::MissingColumn(logical));
            }
        }

        if let Some(sql) = self.custom_table_sql() {
            if !sql.contains(TABLE_NAME_PLACEHOLDER) {
                return Err(ConfigError::MissingPlaceholder(TABLE_NAME_PLACEHOLDER));
            }
            if !sql.contains(VECTOR_SIZE_PLACEHOLDER) {
                return Err(ConfigError::MissingPlaceholder(VECTOR_SIZE_PLACEHOLDER));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PostgresConfig {
        PostgresConfig::new("postgres://localhost/memory")
    }

    #[test]
    fn test_defaults() {
        let config = valid();
        assert_eq!(config.schema, "public");
        assert_eq!(config.table_name_prefix, "km_");
        assert_eq!(config.columns.embedding, "embedding");
        assert_eq!(config.index_discovery, IndexDiscovery::Prefix);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_connection_string() {
        let mut config = valid();
        config.connection_string = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::MissingConnectionString));
    }

    #[test]
    fn test_missing_prefix() {
        let mut config = valid();
        config.table_name_prefix = String::new();
        assert_eq!(config.validate(), Err(ConfigError::MissingTableNamePrefix));
    }

    #[test]
    fn test_each_missing_column_is_reported() {
        let cases: [(&str, fn(&mut ColumnNames)); 5] = [
            ("id", |c| c.id.clear()),
            ("embedding", |c| c.embedding.clear()),
            ("tags", |c| c.tags.clear()),
            ("content", |c| c.content.clear()),
            ("payload", |c| c.payload.clear()),
        ];
        for (logical, clear) in cases {
            let mut config = valid();
            clear(&mut config.columns);
            assert_eq!(config.validate(), Err(ConfigError::MissingColumn(logical)));
        }
    }

    #[test]
    fn test_custom_sql_requires_both_placeholders() {
        let mut config = valid();
        config.create_table_sql = Some(vec![
            "CREATE TABLE %%table_name%% (".to_string(),
            "  id TEXT PRIMARY KEY".to_string(),
            ")".to_string(),
        ]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingPlaceholder(VECTOR_SIZE_PLACEHOLDER))
        );

        config.create_table_sql = Some(vec!["CREATE TABLE t (e vector(%%vector_size%%))".to_string()]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingPlaceholder(TABLE_NAME_PLACEHOLDER))
        );

        config.create_table_sql = Some(vec![
            "CREATE TABLE IF NOT EXISTS %%table_name%% (".to_string(),
            "  embedding vector(%%vector_size%%)".to_string(),
            ")".to_string(),
        ]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_sql_is_joined_with_newlines() {
        let mut config = valid();
        config.create_table_sql = Some(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.custom_table_sql().as_deref(), Some("a\nb"));
    }

    #[test]
    fn test_pool_size_is_not_part_of_validation() {
        let mut config = valid();
        config.min_connections = 20;
        config.max_connections = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: PostgresConfig =
            toml::from_str(r#"connection_string = "postgres://km@localhost/memory""#).unwrap();
        assert_eq!(config.schema, "public");
        assert_eq!(config.table_name_prefix, "km_");
        assert_eq!(config.columns, ColumnNames::default());
        assert!(config.create_table_sql.is_none());
        assert_eq!(config.max_connections, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_values() {
        let toml_str = r#"
connection_string = "postgres://km@db/memory"
schema = "vectors"
table_name_prefix = "mem_"
index_discovery = "comment"
create_table_sql = [
    "CREATE TABLE IF NOT EXISTS %%table_name%% (",
    "  id TEXT PRIMARY KEY,",
    "  vec vector(%%vector_size%%)",
    ")",
]

[columns]
embedding = "vec"
"#;
        let config: PostgresConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.schema, "vectors");
        assert_eq!(config.table_name_prefix, "mem_");
        assert_eq!(config.index_discovery, IndexDiscovery::Comment);
        assert_eq!(config.columns.embedding, "vec");
        assert_eq!(config.columns.id, "id");
        assert_eq!(config.create_table_sql.as_ref().map(Vec::len), Some(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_missing_connection_string_fails_validation() {
        let config: PostgresConfig = toml::from_str("").unwrap();
        assert_eq!(config.validate(), Err(ConfigError::MissingConnectionString));
    }
}
