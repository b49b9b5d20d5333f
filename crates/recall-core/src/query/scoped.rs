//! Scoped reads against one store's category table.
//!
//! Peers may run an older or newer schema, so every strategy degrades rather
//! than fails: a missing table reads as empty, a missing or broken FTS5 mirror
//! falls back to a substring scan over whichever text columns exist, and a
//! missing recency column falls back to rowid order.

use crate::index::{build_fts5_query, build_like_pattern};
use crate::models::Category;
use crate::store::rows::{row_to_json, table_columns, table_exists};
use crate::Result;
use rusqlite::{params_from_iter, Connection, ToSql};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub(crate) type Record = Map<String, Value>;

/// Read up to `limit` records of `category`.
///
/// With a search term, results are ranked by FTS5 (bm25); without one, the
/// most recent records come first.
pub(crate) fn read_records(
    conn: &Connection,
    category: Category,
    search: Option<&str>,
    limit: usize,
) -> Result<Vec<Record>> {
    let table = category.table();
    if !table_exists(conn, table)? {
        warn!("Store has no {} table, returning no records", table);
        return Ok(Vec::new());
    }
    let columns = table_columns(conn, table)?;
    let order = order_column(category, &columns);

    match search {
        Some(term) => {
            if let Some(records) = try_fts(conn, category, term, limit)? {
                return Ok(records);
            }
            like_scan(conn, category, &columns, order, term, limit)
        }
        None => {
            let sql = format!("SELECT * FROM {table} ORDER BY {order} DESC LIMIT ?1");
            run(conn, &sql, &[&(limit as i64)])
        }
    }
}

/// Read the records whose id is in `ids`, or the most recent `limit` records
/// when no ids are given.
pub(crate) fn read_by_ids(
    conn: &Connection,
    category: Category,
    ids: Option<&[String]>,
    limit: usize,
) -> Result<Vec<Record>> {
    let Some(ids) = ids else {
        return read_records(conn, category, None, limit);
    };
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let table = category.table();
    if !table_exists(conn, table)? {
        warn!("Store has no {} table, returning no records", table);
        return Ok(Vec::new());
    }
    let columns = table_columns(conn, table)?;
    if !columns.iter().any(|c| c == "id") {
        warn!("{} table has no id column, cannot select by id", table);
        return Ok(Vec::new());
    }

    let placeholders = (1..=ids.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT * FROM {table} WHERE CAST(id AS TEXT) IN ({placeholders}) ORDER BY {} DESC",
        order_column(category, &columns)
    );
    let params: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
    run(conn, &sql, &params)
}

fn order_column(category: Category, columns: &[String]) -> &'static str {
    let recency = category.recency_column();
    if columns.iter().any(|c| c == recency) {
        recency
    } else {
        "rowid"
    }
}

/// Ranked FTS5 match. `None` means the caller should fall back.
fn try_fts(
    conn: &Connection,
    category: Category,
    term: &str,
    limit: usize,
) -> Result<Option<Vec<Record>>> {
    let fts = category.fts_table();
    if !table_exists(conn, fts)? {
        debug!("No {} table, using substring scan", fts);
        return Ok(None);
    }

    let query = build_fts5_query(term);
    if query.is_empty() {
        return Ok(None);
    }

    let sql = format!(
        "SELECT t.* FROM {table} t JOIN {fts} ON {fts}.rowid = t.rowid
         WHERE {fts} MATCH ?1 ORDER BY {fts}.rank LIMIT ?2",
        table = category.table()
    );
    match run(conn, &sql, &[&query, &(limit as i64)]) {
        Ok(records) => Ok(Some(records)),
        Err(e) => {
            warn!("FTS5 search on {} failed, using substring scan: {}", fts, e);
            Ok(None)
        }
    }
}

fn like_scan(
    conn: &Connection,
    category: Category,
    columns: &[String],
    order: &str,
    term: &str,
    limit: usize,
) -> Result<Vec<Record>> {
    let searchable: Vec<&str> = category
        .text_columns()
        .iter()
        .copied()
        .filter(|c| columns.iter().any(|existing| existing == c))
        .collect();
    if searchable.is_empty() {
        warn!("{} table has no searchable text columns", category.table());
        return Ok(Vec::new());
    }

    let predicate = searchable
        .iter()
        .map(|c| format!("{} LIKE ?1 ESCAPE '\\'", c))
        .collect::<Vec<_>>()
        .join(" OR ");
    let sql = format!(
        "SELECT * FROM {} WHERE {} ORDER BY {} DESC LIMIT ?2",
        category.table(),
        predicate,
        order
    );
    run(conn, &sql, &[&build_like_pattern(term), &(limit as i64)])
}

fn run(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let records = stmt
        .query_map(params_from_iter(params.iter()), |row| row_to_json(row, &columns))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}
