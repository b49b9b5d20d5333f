//! Row access for the `sensitive_access_requests` table.
//!
//! These functions take a bare connection so the same code serves the owner's
//! read-write store and a requester's read-only handle on it.

use crate::config::ConfigKeys;
use crate::models::{AccessRequestStatus, Category, SensitiveAccessRequest};
use crate::store::rows::{read_config_value, table_exists};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

use super::locks::LockSet;

pub(crate) const TABLE: &str = "sensitive_access_requests";

const COLUMNS: &str = "id, requester_instance_id, requester_label, target_type, target_ids_json, \
                       reason, status, requested_at, resolved_at, resolved_by";

/// Load the lock list stored in `conn`'s config table.
pub(crate) fn load_locks(conn: &Connection) -> Result<LockSet> {
    let raw = read_config_value(conn, ConfigKeys::SENSITIVE_LOCKS)?;
    LockSet::parse(raw.as_deref())
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<SensitiveAccessRequest> {
    let target_type: String = row.get(3)?;
    let target_type = Category::from_str(&target_type).ok_or_else(|| {
        conversion_error(
            3,
            crate::RecallError::InvalidCategory(target_type.clone()),
        )
    })?;

    let target_ids: String = row.get(4)?;
    let target_ids: Vec<String> =
        serde_json::from_str(&target_ids).map_err(|e| conversion_error(4, e))?;

    let status: String = row.get(6)?;
    let status = AccessRequestStatus::from_str(&status).ok_or_else(|| {
        conversion_error(
            6,
            crate::RecallError::Validation {
                field: "status".to_string(),
                message: format!("unknown access request status '{}'", status),
            },
        )
    })?;

    let requested_at: String = row.get(7)?;
    let resolved_at: Option<String> = row.get(8)?;

    Ok(SensitiveAccessRequest {
        id: row.get(0)?,
        requester_instance_id: row.get(1)?,
        requester_label: row.get(2)?,
        target_type,
        target_ids,
        reason: row.get(5)?,
        status,
        requested_at: parse_time(7, &requested_at)?,
        resolved_at: resolved_at.as_deref().map(|t| parse_time(8, t)).transpose()?,
        resolved_by: row.get(9)?,
    })
}

pub(crate) fn insert(conn: &Connection, request: &SensitiveAccessRequest) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO {TABLE} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
        params![
            request.id,
            request.requester_instance_id,
            request.requester_label,
            request.target_type.as_str(),
            serde_json::to_string(&request.target_ids)?,
            request.reason,
            request.status.as_str(),
            request.requested_at.to_rfc3339(),
            request.resolved_at.map(|t| t.to_rfc3339()),
            request.resolved_by,
        ],
    )?;
    Ok(())
}

pub(crate) fn get(conn: &Connection, id: &str) -> Result<Option<SensitiveAccessRequest>> {
    let request = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = ?1"),
            params![id],
            request_from_row,
        )
        .optional()?;
    Ok(request)
}

pub(crate) fn list(
    conn: &Connection,
    status: Option<AccessRequestStatus>,
) -> Result<Vec<SensitiveAccessRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM {TABLE}
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY requested_at DESC, id"
    ))?;
    let requests = stmt
        .query_map(params![status.map(|s| s.as_str())], request_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(requests)
}

/// Move a pending request to `status`. Returns whether a row changed; an
/// already-resolved or missing request changes nothing.
pub(crate) fn resolve(
    conn: &Connection,
    id: &str,
    status: AccessRequestStatus,
    resolved_by: &str,
    resolved_at: DateTime<Utc>,
) -> Result<bool> {
    let changed = conn.execute(
        &format!(
            "UPDATE {TABLE} SET status = ?1, resolved_at = ?2, resolved_by = ?3
             WHERE id = ?4 AND status = 'pending'"
        ),
        params![status.as_str(), resolved_at.to_rfc3339(), resolved_by, id],
    )?;
    Ok(changed > 0)
}

pub(crate) fn count_pending(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {TABLE} WHERE status = 'pending'"),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Union of ids across `requester`'s approved requests for `category`.
///
/// Stores without the table have approved nothing.
pub(crate) fn approved_ids(
    conn: &Connection,
    requester: &str,
    category: Category,
) -> Result<BTreeSet<String>> {
    if !table_exists(conn, TABLE)? {
        return Ok(BTreeSet::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT target_ids_json FROM {TABLE}
         WHERE requester_instance_id = ?1 AND target_type = ?2 AND status = 'approved'"
    ))?;
    let rows = stmt.query_map(params![requester, category.as_str()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut ids = BTreeSet::new();
    for raw in rows {
        let parsed: Vec<String> = serde_json::from_str(&raw?)?;
        ids.extend(parsed);
    }
    Ok(ids)
}
