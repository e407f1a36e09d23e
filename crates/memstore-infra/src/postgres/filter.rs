//! Translation of [`MemoryFilter`]s into a parameterized SQL predicate.
//!
//! Clauses of one filter are ANDed, filters are ORed. Every caller value is
//! bound; the only text spliced into SQL is the validated tags column and the
//! fragments of raw clauses.

use memstore_types::error::MemoryDbError;
use memstore_types::memory::{tag_pair, FilterClause, FilterValue, MemoryFilter};
use sqlx::{Postgres, QueryBuilder};

use super::identifier::QuotedIdentifier;

/// Stands for the physical tags column inside a raw clause.
pub const TAGS_PLACEHOLDER: &str = "%%tags%%";

/// Marks where the next raw-clause parameter is bound.
pub const PARAM_PLACEHOLDER: &str = "%%param%%";

/// Raw clause text with `%%tags%%` replaced; parameter markers are counted
/// and split on this form.
fn expand_tags(sql: &str, tags: &QuotedIdentifier) -> String {
    sql.replace(TAGS_PLACEHOLDER, &tags.to_string())
}

/// Reject malformed filters before any SQL is built.
pub fn validate_filters(
    filters: &[MemoryFilter],
    tags: &QuotedIdentifier,
) -> Result<(), MemoryDbError> {
    for clause in filters.iter().flat_map(|f| f.clauses.iter()) {
        match clause {
            FilterClause::TagEquals { key, .. } | FilterClause::TagIn { key, .. }
                if key.is_empty() =>
            {
                return Err(MemoryDbError::InvalidFilter("tag key is empty".to_string()));
            }
            FilterClause::TagEquals { .. } => {}
            FilterClause::TagIn { key, values } => {
                if values.is_empty() {
                    return Err(MemoryDbError::InvalidFilter(format!(
                        "no values given for tag '{key}'"
                    )));
                }
            }
            FilterClause::Raw { sql, params } => {
                if sql.trim().is_empty() {
                    return Err(MemoryDbError::InvalidFilter("raw clause is empty".to_string()));
                }
                let markers = expand_tags(sql, tags).matches(PARAM_PLACEHOLDER).count();
                if markers != params.len() {
                    return Err(MemoryDbError::InvalidFilter(format!(
                        "raw clause has {markers} parameter markers but {} values",
                        params.len()
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Append the predicate for `filters` to `builder`.
///
/// No filters, or any empty filter, yields `TRUE`.
pub fn push_predicate(
    builder: &mut QueryBuilder<'static, Postgres>,
    tags: &QuotedIdentifier,
    filters: &[MemoryFilter],
) -> Result<(), MemoryDbError> {
    validate_filters(filters, tags)?;

    if filters.is_empty() || filters.iter().any(MemoryFilter::is_empty) {
        builder.push("TRUE");
        return Ok(());
    }

    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(" OR ");
        }
        builder.push("(");
        for (j, clause) in filter.clauses.iter().enumerate() {
            if j > 0 {
                builder.push(" AND ");
            }
            push_clause(builder, tags, clause);
        }
        builder.push(")");
    }

    Ok(())
}

fn push_clause(
    builder: &mut QueryBuilder<'static, Postgres>,
    tags: &QuotedIdentifier,
    clause: &FilterClause,
) {
    match clause {
        FilterClause::TagEquals { key, value } => {
            builder.push(format!("{tags} @> "));
            builder.push_bind(vec![tag_pair(key, value)]);
            builder.push("::TEXT[]");
        }
        FilterClause::TagIn { key, values } => {
            let pairs: Vec<String> = values.iter().map(|v| tag_pair(key, v)).collect();
            builder.push(format!("{tags} && "));
            builder.push_bind(pairs);
            builder.push("::TEXT[]");
        }
        FilterClause::Raw { sql, params } => {
            let sql = expand_tags(sql, tags);
            builder.push("(");
            let mut params = params.iter();
            for (k, fragment) in sql.split(PARAM_PLACEHOLDER).enumerate() {
                if k > 0 {
                    // Counts were checked in validate_filters.
                    match params.next() {
                        Some(FilterValue::Text(text)) => {
                            builder.push_bind(text.clone());
                        }
                        Some(FilterValue::TextList(list)) => {
                            builder.push_bind(list.clone());
                        }
                        None => {}
                    }
                }
                builder.push(fragment);
            }
            builder.push(")");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postgres::identifier::validate_field_name;

    fn render(filters: &[MemoryFilter]) -> Result<String, MemoryDbError> {
        let tags = validate_field_name("tags").unwrap();
        let mut builder = QueryBuilder::new("WHERE ");
        push_predicate(&mut builder, &tags, filters)?;
        Ok(builder.sql().to_string())
    }

    #[test]
    fn test_no_filters_is_true() {
        assert_eq!(render(&[]).unwrap(), "WHERE TRUE");
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filters = [MemoryFilter::by_tag("lang", "en"), MemoryFilter::new()];
        assert_eq!(render(&filters).unwrap(), "WHERE TRUE");
    }

    #[test]
    fn test_clauses_are_anded_and_bound() {
        let filters = [MemoryFilter::by_tag("lang", "en").and_tag("type", "doc")];
        assert_eq!(
            render(&filters).unwrap(),
            r#"WHERE ("tags" @> $1::TEXT[] AND "tags" @> $2::TEXT[])"#
        );
    }

    #[test]
    fn test_filters_are_ored() {
        let filters = [
            MemoryFilter::by_tag("lang", "en"),
            MemoryFilter::new().and_tag_in("type", ["doc", "note"]),
        ];
        assert_eq!(
            render(&filters).unwrap(),
            r#"WHERE ("tags" @> $1::TEXT[]) OR ("tags" && $2::TEXT[])"#
        );
    }

    #[test]
    fn test_values_never_reach_sql_text() {
        let filters = [MemoryFilter::by_tag("lang", "en'); DROP TABLE x; --")];
        let sql = render(&filters).unwrap();
        assert!(!sql.contains("DROP"));
        assert!(!sql.contains("lang"));
    }

    #[test]
    fn test_raw_clause_substitutes_tokens() {
        let filters = [MemoryFilter::by_tag("lang", "en").and_raw(
            "cardinality(%%tags%%) > 1 AND NOT (%%tags%% @> %%param%%) AND %%param%% = 'x'",
            vec![
                FilterValue::TextList(vec!["archived=true".to_string()]),
                FilterValue::Text("x".to_string()),
            ],
        )];
        assert_eq!(
            render(&filters).unwrap(),
            r#"WHERE ("tags" @> $1::TEXT[] AND (cardinality("tags") > 1 AND NOT ("tags" @> $2) AND $3 = 'x'))"#
        );
    }

    #[test]
    fn test_raw_clause_parameter_count_must_match() {
        let filters = [MemoryFilter::new().and_raw("%%tags%% @> %%param%%", vec![])];
        assert!(matches!(render(&filters), Err(MemoryDbError::InvalidFilter(_))));
    }

    #[test]
    fn test_markers_counted_after_tags_substitution() {
        // The trailing "%%" of the tags token is not the start of a marker.
        let filters = [MemoryFilter::new().and_raw(
            "%%tags%%param%% IS NOT NULL",
            vec![FilterValue::Text("x".to_string())],
        )];
        assert!(matches!(render(&filters), Err(MemoryDbError::InvalidFilter(_))));

        let filters = [MemoryFilter::new().and_raw("%%tags%%param%% IS NOT NULL", vec![])];
        assert_eq!(
            render(&filters).unwrap(),
            r#"WHERE (("tags"param%% IS NOT NULL))"#
        );
    }

    #[test]
    fn test_tag_in_requires_values() {
        let filters = [MemoryFilter::new().and_tag_in("type", Vec::<String>::new())];
        assert!(matches!(render(&filters), Err(MemoryDbError::InvalidFilter(_))));
    }

    #[test]
    fn test_empty_tag_key_is_rejected() {
        let filters = [MemoryFilter::by_tag("", "en")];
        assert!(matches!(render(&filters), Err(MemoryDbError::InvalidFilter(_))));
    }
}
