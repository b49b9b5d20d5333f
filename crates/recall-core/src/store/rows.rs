//! Schema probing and row conversion shared by local and peer reads.
//!
//! Peer stores may be older or newer than this crate, so nothing here assumes
//! a table or column exists without asking SQLite first.

use crate::Result;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

/// Whether a table (or virtual table) named `table` exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Column names of `table` in declaration order. Empty if the table is missing.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Convert one result row into a JSON object keyed by column name.
///
/// Blobs are hex-encoded; everything else maps onto the matching JSON scalar.
pub fn row_to_json(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Map<String, Value>> {
    let mut object = Map::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
        };
        object.insert(name.clone(), value);
    }
    Ok(object)
}

/// The record id of a JSON row, normalized to a string.
///
/// Sessions use text ids while decisions and tasks use integer ids; locks and
/// access requests store both as strings.
pub fn record_id(record: &Map<String, Value>) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read one value from a store's `config` table.
///
/// A store without a `config` table simply has no settings.
pub fn read_config_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, "config")? {
        return Ok(None);
    }
    let value = conn
        .query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE things (id INTEGER PRIMARY KEY, name TEXT, score REAL, raw BLOB);
             INSERT INTO things VALUES (5, 'five', 2.5, x'beef');
             INSERT INTO things VALUES (6, NULL, NULL, NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_table_probing() {
        let conn = memory_db();
        assert!(table_exists(&conn, "things").unwrap());
        assert!(!table_exists(&conn, "missing").unwrap());
        assert_eq!(
            table_columns(&conn, "things").unwrap(),
            vec!["id", "name", "score", "raw"]
        );
        assert!(table_columns(&conn, "missing").unwrap().is_empty());
    }

    #[test]
    fn test_row_to_json_value_types() {
        let conn = memory_db();
        let columns = table_columns(&conn, "things").unwrap();
        let mut stmt = conn.prepare("SELECT * FROM things ORDER BY id").unwrap();
        let rows: Vec<_> = stmt
            .query_map([], |row| row_to_json(row, &columns))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({"id": 5, "name": "five", "score": 2.5, "raw": "beef"})
        );
        assert_eq!(rows[1]["name"], Value::Null);
        assert_eq!(record_id(&rows[0]).as_deref(), Some("5"));
    }

    #[test]
    fn test_record_id_accepts_text_ids() {
        let record = json!({"id": "sess-1"}).as_object().cloned().unwrap();
        assert_eq!(record_id(&record).as_deref(), Some("sess-1"));

        let no_id = json!({"name": "x"}).as_object().cloned().unwrap();
        assert_eq!(record_id(&no_id), None);
    }

    #[test]
    fn test_read_config_without_table() {
        let conn = memory_db();
        assert_eq!(read_config_value(&conn, "sharing_mode").unwrap(), None);
    }
}
