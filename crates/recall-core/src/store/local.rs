//! The instance's own SQLite store.
//!
//! Only the parts the coordination layer relies on live here: the `config`
//! key-value table, the access-request log and the category tables with their
//! FTS5 mirrors. Writing session/decision/task records is left to the
//! repository layer, which reaches the connection through `with_connection`.

use super::rows::table_exists;
use super::settings::ConfigStore;
use crate::config::StoreConfig;
use crate::index::FTS5Manager;
use crate::models::{Category, InstanceStats};
use crate::{RecallError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    name TEXT,
    summary TEXT,
    agent TEXT,
    started_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE TABLE IF NOT EXISTS decisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT,
    title TEXT NOT NULL,
    decision TEXT NOT NULL,
    rationale TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'open',
    priority INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sensitive_access_requests (
    id TEXT PRIMARY KEY,
    requester_instance_id TEXT NOT NULL,
    requester_label TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_ids_json TEXT NOT NULL,
    reason TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    requested_at TEXT NOT NULL,
    resolved_at TEXT,
    resolved_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_access_requests_requester
    ON sensitive_access_requests(requester_instance_id, target_type, status);
";

/// Handle to the instance's own store.
///
/// Cloning is cheap; clones share one connection behind a mutex. SQLite's WAL
/// mode lets peers read the file while this process writes.
#[derive(Clone)]
pub struct LocalStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl LocalStore {
    /// Open (or create) the store at `db_path`, bringing the schema up to date.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| RecallError::Io {
                    message: format!("Failed to create store directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| RecallError::Database {
            message: format!("Failed to open store {}: {}", db_path.display(), e),
            source: Some(e),
        })?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        debug!("Opened local store at {}", db_path.display());
        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA).map_err(|e| RecallError::Database {
            message: format!("Failed to initialize store schema: {}", e),
            source: Some(e),
        })?;

        for category in Category::ALL {
            FTS5Manager::new(category).ensure_setup(conn)?;
        }

        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < StoreConfig::SCHEMA_VERSION {
            conn.execute_batch(&format!(
                "PRAGMA user_version = {};",
                StoreConfig::SCHEMA_VERSION
            ))?;
            info!(
                "Upgraded store schema from v{} to v{}",
                version,
                StoreConfig::SCHEMA_VERSION
            );
        }
        Ok(())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RecallError::Database {
            message: "Failed to acquire store connection lock".to_string(),
            source: None,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run `f` against the underlying connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock_conn()?;
        f(&conn)
    }

    /// Schema version recorded in the database header.
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.lock_conn()?;
        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Row counts per category and the size of the database file.
    pub fn stats(&self) -> Result<InstanceStats> {
        let mut stats = InstanceStats::default();
        {
            let conn = self.lock_conn()?;
            for category in Category::ALL {
                let count: i64 = if table_exists(&conn, category.table())? {
                    conn.query_row(
                        &format!("SELECT COUNT(*) FROM {}", category.table()),
                        [],
                        |row| row.get(0),
                    )?
                } else {
                    0
                };
                stats
                    .counts
                    .insert(category.as_str().to_string(), count.max(0) as u64);
            }
        }

        stats.size_bytes = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(stats)
    }
}

impl ConfigStore for LocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, timestamp.to_rfc3339()],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}
