//! Search term translation for FTS5 and the substring fallback.

use regex::Regex;
use std::sync::LazyLock;

/// Characters the FTS5 query grammar treats specially inside a bare term.
static FTS5_SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[-._:/"]"#).expect("static regex"));

/// Escape a term for FTS5 queries.
///
/// Terms containing special characters are wrapped in quotes, with embedded
/// quotes doubled.
pub fn escape_fts5_term(term: &str) -> String {
    if FTS5_SPECIAL_CHARS.is_match(term) {
        format!("\"{}\"", term.replace('"', "\"\""))
    } else {
        term.to_string()
    }
}

/// Build an FTS5 query string from a free-text search.
///
/// Every whitespace-separated term becomes a prefix match and the terms are
/// OR-ed, so ranking (bm25) decides ordering rather than strict conjunction:
/// - "retry backoff" → `retry* OR backoff*`
/// - "auth-flow" → `"auth-flow"*`
pub fn build_fts5_query(search_term: &str) -> String {
    search_term
        .to_lowercase()
        .split_whitespace()
        .map(escape_fts5_term)
        .filter(|t| !t.is_empty())
        .map(|t| format!("{}*", t))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Build a `LIKE` pattern matching `search_term` anywhere, escaping `%`, `_`
/// and the escape character itself. Use with `ESCAPE '\'`.
pub fn build_like_pattern(search_term: &str) -> String {
    let mut escaped = String::with_capacity(search_term.len() + 2);
    escaped.push('%');
    for c in search_term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
