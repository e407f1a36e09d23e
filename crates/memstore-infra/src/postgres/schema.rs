//! Logical-to-physical naming for memory index tables.
//!
//! An index `docs` with prefix `km_` in schema `public` lives in
//! `"public"."km_docs"`. Column names come from the configuration and are
//! validated once, when the schema model is built.

use std::fmt;

use memstore_types::config::{
    IndexDiscovery, PostgresConfig, TABLE_MARKER_COMMENT, TABLE_NAME_PLACEHOLDER,
    VECTOR_SIZE_PLACEHOLDER,
};
use memstore_core::index::name::normalize_index_name;
use memstore_types::error::MemoryDbError;

use super::identifier::{
    validate_field_name, validate_schema_name, validate_table_name, validate_table_name_prefix,
    QuotedIdentifier,
};

/// Timestamp column; not configurable.
pub const LAST_UPDATE_COLUMN: &str = "last_update";

/// Physical columns of an index table.
#[derive(Debug, Clone)]
pub struct Columns {
    pub id: QuotedIdentifier,
    pub embedding: QuotedIdentifier,
    pub tags: QuotedIdentifier,
    pub content: QuotedIdentifier,
    pub payload: QuotedIdentifier,
    pub last_update: QuotedIdentifier,
}

/// A schema-qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTable {
    pub schema: QuotedIdentifier,
    pub table: QuotedIdentifier,
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Naming scheme and DDL for index tables.
#[derive(Debug, Clone)]
pub struct TableSchema {
    schema: QuotedIdentifier,
    prefix: String,
    columns: Columns,
    custom_table_sql: Option<String>,
    discovery: IndexDiscovery,
}

impl TableSchema {
    /// Validate the configuration and every configured identifier.
    ///
    /// Performs no I/O.
    pub fn new(config: &PostgresConfig) -> Result<Self, MemoryDbError> {
        config.validate()?;

        let schema = validate_schema_name(&config.schema)?;
        let prefix = validate_table_name_prefix(&config.table_name_prefix)?;
        let columns = Columns {
            id: validate_field_name(&config.columns.id)?,
            embedding: validate_field_name(&config.columns.embedding)?,
            tags: validate_field_name(&config.columns.tags)?,
            content: validate_field_name(&config.columns.content)?,
            payload: validate_field_name(&config.columns.payload)?,
            last_update: validate_field_name(LAST_UPDATE_COLUMN)?,
        };

        Ok(Self {
            schema,
            prefix: prefix.name().to_string(),
            columns,
            custom_table_sql: config.custom_table_sql(),
            discovery: config.index_discovery,
        })
    }

    pub fn schema_name(&self) -> &str {
        self.schema.name()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn discovery(&self) -> IndexDiscovery {
        self.discovery
    }

    /// Resolve a normalized index name to its table.
    pub fn table(&self, index: &str) -> Result<QualifiedTable, MemoryDbError> {
        let table = validate_table_name(&format!("{}{}", self.prefix, index))?;
        Ok(QualifiedTable {
            schema: self.schema.clone(),
            table,
        })
    }

    /// Recover the index name from a table name: case-insensitive prefix
    /// match, prefix stripped.
    ///
    /// `None` for foreign tables and for names that would not address this
    /// same table again once normalized (`KM_Notes`, `km_my-table`).
    pub fn index_name_from_table(&self, table_name: &str) -> Option<String> {
        let head = table_name.get(..self.prefix.len())?;
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        let index = &table_name[self.prefix.len()..];
        if index.is_empty() || normalize_index_name(index) != index {
            return None;
        }
        let resolved = self.table(index).ok()?;
        (resolved.table.name() == table_name).then(|| index.to_string())
    }

    /// DDL batch creating the table for `table`.
    pub fn create_table_sql(
        &self,
        table: &QualifiedTable,
        vector_size: usize,
    ) -> Result<String, MemoryDbError> {
        let comment = format!("COMMENT ON TABLE {table} IS '{TABLE_MARKER_COMMENT}';");

        if let Some(template) = &self.custom_table_sql {
            let mut sql = template
                .replace(TABLE_NAME_PLACEHOLDER, &table.to_string())
                .replace(VECTOR_SIZE_PLACEHOLDER, &vector_size.to_string());
            if self.discovery == IndexDiscovery::Comment {
                if !sql.trim_end().ends_with(';') {
                    sql.push(';');
                }
                sql.push('\n');
                sql.push_str(&comment);
            }
            return Ok(sql);
        }

        let c = &self.columns;
        let tags_index = validate_table_name(&format!("{}_idx_tags", table.table.name()))?;

        Ok(format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
    {id} TEXT NOT NULL PRIMARY KEY,
    {embedding} vector({vector_size}),
    {tags} TEXT[] DEFAULT '{{}}'::TEXT[] NOT NULL,
    {content} TEXT DEFAULT '' NOT NULL,
    {payload} JSONB DEFAULT '{{}}'::JSONB NOT NULL,
    {last_update} TIMESTAMP WITH TIME ZONE NOT NULL
);
CREATE INDEX IF NOT EXISTS {tags_index} ON {table} USING GIN({tags});
{comment}"#,
            id = c.id,
            embedding = c.embedding,
            tags = c.tags,
            content = c.content,
            payload = c.payload,
            last_update = c.last_update,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memstore_types::config::ColumnNames;
    use memstore_types::error::IdentifierKind;

    fn config() -> PostgresConfig {
        PostgresConfig::new("postgres://localhost/memory")
    }

    #[test]
    fn test_table_reference_is_quoted_and_qualified() {
        let schema = TableSchema::new(&config()).unwrap();
        let table = schema.table("docs").unwrap();
        assert_eq!(table.to_string(), r#""public"."km_docs""#);
        assert_eq!(table.table.name(), "km_docs");
    }

    #[test]
    fn test_index_with_dash_is_rejected_as_table_name() {
        let schema = TableSchema::new(&config()).unwrap();
        match schema.table("my-docs") {
            Err(MemoryDbError::InvalidIdentifier { kind, value }) => {
                assert_eq!(kind, IdentifierKind::Table);
                assert_eq!(value, "km_my-docs");
            }
            other => panic!("expected InvalidIdentifier, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_identifiers_fail_construction() {
        let mut bad_schema = config();
        bad_schema.schema = "public;".to_string();
        assert!(matches!(
            TableSchema::new(&bad_schema),
            Err(MemoryDbError::InvalidIdentifier { kind: IdentifierKind::Schema, .. })
        ));

        let mut bad_prefix = config();
        bad_prefix.table_name_prefix = "km-".to_string();
        assert!(matches!(
            TableSchema::new(&bad_prefix),
            Err(MemoryDbError::InvalidIdentifier { kind: IdentifierKind::TablePrefix, .. })
        ));

        let mut bad_column = config();
        bad_column.columns = ColumnNames {
            tags: "tags\"".to_string(),
            ..ColumnNames::default()
        };
        assert!(matches!(
            TableSchema::new(&bad_column),
            Err(MemoryDbError::InvalidIdentifier { kind: IdentifierKind::Field, .. })
        ));
    }

    #[test]
    fn test_missing_connection_string_is_configuration_error() {
        let mut cfg = config();
        cfg.connection_string.clear();
        assert!(matches!(
            TableSchema::new(&cfg),
            Err(MemoryDbError::Configuration(_))
        ));
    }

    #[test]
    fn test_index_name_from_table_strips_prefix() {
        let schema = TableSchema::new(&config()).unwrap();
        assert_eq!(schema.index_name_from_table("km_docs").as_deref(), Some("docs"));
        assert_eq!(schema.index_name_from_table("km_2024_notes").as_deref(), Some("2024_notes"));
        assert_eq!(schema.index_name_from_table("users"), None);
        assert_eq!(schema.index_name_from_table("km_"), None);
        assert_eq!(schema.index_name_from_table("k"), None);
    }

    #[test]
    fn test_index_name_from_table_requires_round_trip() {
        let schema = TableSchema::new(&config()).unwrap();
        // "notes" would address "km_notes", not this table.
        assert_eq!(schema.index_name_from_table("KM_notes"), None);
        assert_eq!(schema.index_name_from_table("km_Notes"), None);
        assert_eq!(schema.index_name_from_table("km_my-table"), None);
        assert_eq!(schema.index_name_from_table("km_ padded"), None);
    }

    #[test]
    fn test_upper_case_prefix_matches_its_own_tables() {
        let mut cfg = config();
        cfg.table_name_prefix = "KM_".to_string();
        let schema = TableSchema::new(&cfg).unwrap();
        assert_eq!(schema.index_name_from_table("KM_docs").as_deref(), Some("docs"));
        assert_eq!(schema.index_name_from_table("km_docs"), None);
    }

    #[test]
    fn test_default_ddl_uses_configured_columns() {
        let mut cfg = config();
        cfg.columns.embedding = "vec".to_string();
        let schema = TableSchema::new(&cfg).unwrap();
        let table = schema.table("docs").unwrap();
        let sql = schema.create_table_sql(&table, 1536).unwrap();

        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "public"."km_docs" ("#));
        assert!(sql.contains(r#""id" TEXT NOT NULL PRIMARY KEY"#));
        assert!(sql.contains(r#""vec" vector(1536)"#));
        assert!(sql.contains(r#""tags" TEXT[] DEFAULT '{}'::TEXT[] NOT NULL"#));
        assert!(sql.contains(r#""payload" JSONB DEFAULT '{}'::JSONB NOT NULL"#));
        assert!(sql.contains(r#""last_update" TIMESTAMP WITH TIME ZONE NOT NULL"#));
        assert!(sql.contains(
            r#"CREATE INDEX IF NOT EXISTS "km_docs_idx_tags" ON "public"."km_docs" USING GIN("tags");"#
        ));
        assert!(sql.ends_with(&format!(
            r#"COMMENT ON TABLE "public"."km_docs" IS '{TABLE_MARKER_COMMENT}';"#
        )));
    }

    #[test]
    fn test_custom_ddl_substitutes_placeholders() {
        let mut cfg = config();
        cfg.create_table_sql = Some(vec![
            "CREATE TABLE IF NOT EXISTS %%table_name%% (".to_string(),
            "  id TEXT PRIMARY KEY,".to_string(),
            "  embedding vector(%%vector_size%%)".to_string(),
            ")".to_string(),
        ]);
        let schema = TableSchema::new(&cfg).unwrap();
        let table = schema.table("docs").unwrap();
        let sql = schema.create_table_sql(&table, 3).unwrap();

        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"public\".\"km_docs\" (\n  id TEXT PRIMARY KEY,\n  embedding vector(3)\n)"
        );
    }

    #[test]
    fn test_custom_ddl_gets_marker_in_comment_mode() {
        let mut cfg = config();
        cfg.index_discovery = IndexDiscovery::Comment;
        cfg.create_table_sql = Some(vec![
            "CREATE TABLE %%table_name%% (id TEXT, e vector(%%vector_size%%))".to_string(),
        ]);
        let schema = TableSchema::new(&cfg).unwrap();
        let table = schema.table("docs").unwrap();
        let sql = schema.create_table_sql(&table, 3).unwrap();

        assert!(sql.starts_with("CREATE TABLE \"public\".\"km_docs\" (id TEXT, e vector(3));\n"));
        assert!(sql.ends_with(&format!("IS '{TABLE_MARKER_COMMENT}';")));
    }
}
