//! Logical index-name normalization.

use memstore_types::memory::DEFAULT_INDEX;

/// Normalize a caller-supplied index name.
///
/// Trims surrounding whitespace and lowercases. An empty result maps to
/// [`DEFAULT_INDEX`]. Nothing else is rewritten: `-` and other characters are
/// left in place so that the backend's identifier check rejects them, rather
/// than folding distinct names like `a-b` and `a_b` into one table.
pub fn normalize_index_name(index: &str) -> String {
    let trimmed = index.trim();
    if trimmed.is_empty() {
        return DEFAULT_INDEX.to_string();
    }
    trimmed.to_lowercase()
}
