//! Memory record and query types.
//!
//! A memory index is a named collection of [`MemoryRecord`]s. Records carry an
//! embedding, a set of `key=value` tags used for filtering, the text content
//! and an arbitrary JSON payload.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index used when the caller passes an empty index name.
pub const DEFAULT_INDEX: &str = "default";

/// Payload key reserved for the record content, which has its own column.
pub const CONTENT_PAYLOAD_KEY: &str = "text";

/// Separator between tag key and value in the serialized form.
pub const TAG_SEPARATOR: char = '=';

/// Tags attached to a record: each key maps to one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCollection(BTreeMap<String, Vec<String>>);

impl TagCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value under `key`, keeping earlier values.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten into `key=value` strings, one per value, ordered by key.
    pub fn to_key_value_list(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |v| tag_pair(key, v)))
            .collect()
    }

    /// Parse the stored `key=value` form. Splits on the first separator; an
    /// entry without one becomes a key with an empty value.
    pub fn from_key_value_list<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            match pair.split_once(TAG_SEPARATOR) {
                Some((key, value)) => tags.add(key, value),
                None => tags.add(pair, ""),
            }
        }
        tags
    }
}

/// Render a single tag in its stored `key=value` form.
pub fn tag_pair(key: &str, value: &str) -> String {
    format!("{key}{TAG_SEPARATOR}{value}")
}

/// A record stored in a memory index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Primary key, unique within the index.
    pub id: String,
    /// Must match the index's vector size. Empty when read without embeddings.
    pub embedding: Vec<f32>,
    pub tags: TagCollection,
    pub content: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Defaults to the write time when `None`.
    pub last_update: Option<DateTime<Utc>>,
}

impl MemoryRecord {
    pub fn new(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            embedding,
            tags: TagCollection::new(),
            content: String::new(),
            payload: serde_json::Map::new(),
            last_update: None,
        }
    }
}

/// A bound value referenced by a `%%param%%` marker in a raw filter fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterValue {
    Text(String),
    TextList(Vec<String>),
}

/// One condition of a [`MemoryFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterClause {
    /// The record has the tag `key=value`.
    TagEquals { key: String, value: String },
    /// The record has `key=v` for at least one `v` in `values`.
    TagIn { key: String, values: Vec<String> },
    /// Backend-specific predicate. `%%tags%%` names the tags column and each
    /// `%%param%%` binds the next entry of `params`.
    Raw { sql: String, params: Vec<FilterValue> },
}

/// Conjunction of clauses. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFilter {
    pub clauses: Vec<FilterClause>,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_tag(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new().and_tag(key, value)
    }

    pub fn and_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push(FilterClause::TagEquals {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn and_tag_in<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clauses.push(FilterClause::TagIn {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn and_raw(mut self, sql: impl Into<String>, params: Vec<FilterValue>) -> Self {
        self.clauses.push(FilterClause::Raw {
            sql: sql.into(),
            params,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Parameters for a similarity search. Filters are ORed with each other.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery {
    pub filters: Vec<MemoryFilter>,
    /// Minimum score (`1 - cosine distance`) a result must reach.
    pub min_relevance: f64,
    /// `None` returns every match.
    pub limit: Option<u32>,
    pub offset: u32,
    pub with_embeddings: bool,
}

impl Default for SimilarityQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            min_relevance: 0.0,
            limit: None,
            offset: 0,
            with_embeddings: false,
        }
    }
}

/// Column a plain listing can be ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    Id,
    Content,
    LastUpdate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Ordering for [`ListQuery`]. Defaults to id ascending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOrder {
    pub column: SortColumn,
    pub direction: SortDirection,
}

/// Parameters for listing records without a distance computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<MemoryFilter>,
    pub order: Option<ListOrder>,
    pub limit: Option<u32>,
    pub offset: u32,
    pub with_embeddings: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_flatten_one_entry_per_value() {
        let tags = TagCollection::new()
            .with("user", "alice")
            .with("lang", "en")
            .with("lang", "it");
        assert_eq!(
            tags.to_key_value_list(),
            vec!["lang=en", "lang=it", "user=alice"]
        );
    }

    #[test]
    fn test_tags_parse_splits_on_first_separator() {
        let tags = TagCollection::from_key_value_list(["expr=a=b", "lang=en", "flag"]);
        assert_eq!(tags.get("expr"), Some(&["a=b".to_string()][..]));
        assert_eq!(tags.get("lang"), Some(&["en".to_string()][..]));
        assert_eq!(tags.get("flag"), Some(&[String::new()][..]));
    }

    #[test]
    fn test_tags_stored_form_reads_back_equal() {
        let tags = TagCollection::new()
            .with("type", "doc")
            .with("type", "note")
            .with("owner", "x");
        let parsed = TagCollection::from_key_value_list(tags.to_key_value_list());
        assert_eq!(parsed, tags);
    }

    #[test]
    fn test_filter_builder_collects_clauses() {
        let filter = MemoryFilter::by_tag("lang", "en")
            .and_tag_in("type", ["doc", "note"])
            .and_raw("%%tags%% && %%param%%", vec![FilterValue::TextList(vec!["a=b".into()])]);
        assert_eq!(filter.clauses.len(), 3);
        assert!(matches!(
            &filter.clauses[1],
            FilterClause::TagIn { key, values } if key == "type" && values.len() == 2
        ));
    }

    #[test]
    fn test_list_order_default_is_id_ascending() {
        let order = ListOrder::default();
        assert_eq!(order.column, SortColumn::Id);
        assert_eq!(order.direction, SortDirection::Asc);
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let mut record = MemoryRecord::new("a", vec![1.0, 0.0, 0.0]);
        record.tags.add("lang", "en");
        record.content = "hello".to_string();
        record
            .payload
            .insert("source".to_string(), serde_json::json!("unit"));

        let json = serde_json::to_string(&record).unwrap();
        let parsed: MemoryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
