//! Full-text search support for category tables.
//!
//! - FTS5 mirror tables and their sync triggers
//! - Query building for FTS5 and the substring fallback

mod fts5;
mod query;

pub use fts5::FTS5Manager;
pub use query::{build_fts5_query, build_like_pattern, escape_fts5_term};
