//! FTS5 virtual table setup and management for category tables.

use crate::models::Category;
use crate::Result;
use rusqlite::Connection;
use tracing::{debug, info};

const TOKENIZER: &str = "unicode61 remove_diacritics 1";

/// Manager for the FTS5 mirror of one category table.
///
/// The mirror is a standalone FTS5 table whose rowid tracks the rowid of the
/// category table; triggers keep the two in sync.
pub struct FTS5Manager {
    category: Category,
}

impl FTS5Manager {
    /// Create a new FTS5 manager.
    pub fn new(category: Category) -> Self {
        Self { category }
    }

    /// Check if the FTS5 table exists.
    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [self.category.fts_table()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Check if the FTS5 triggers exist.
    pub fn triggers_exist(&self, conn: &Connection) -> Result<bool> {
        let trigger_name = format!("{}_ai", self.category.fts_table());
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='trigger' AND name=?1",
            [&trigger_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Ensure FTS5 is fully set up.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<()> {
        if !self.table_exists(conn)? {
            self.create_table(conn)?;
            self.populate(conn)?;
        } else if !self.triggers_exist(conn)? {
            // Table exists but triggers missing - rebuild contents
            self.populate(conn)?;
        }

        self.create_triggers(conn)?;
        Ok(())
    }

    /// Create the FTS5 virtual table.
    pub fn create_table(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5({}, tokenize='{}')",
            self.category.fts_table(),
            self.category.text_columns().join(", "),
            TOKENIZER
        );

        conn.execute(&sql, [])?;
        info!("Created FTS5 table: {}", self.category.fts_table());
        Ok(())
    }

    /// Create triggers to keep the FTS5 mirror in sync with its table.
    pub fn create_triggers(&self, conn: &Connection) -> Result<()> {
        let table = self.category.table();
        let fts = self.category.fts_table();
        let columns = self.category.text_columns().join(", ");
        let new_values = self.prefixed_columns("NEW");

        let insert_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_ai AFTER INSERT ON {table} BEGIN
                INSERT INTO {fts} (rowid, {columns}) VALUES (NEW.rowid, {new_values});
            END"
        );
        conn.execute(&insert_trigger, [])?;

        let update_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_au AFTER UPDATE ON {table} BEGIN
                DELETE FROM {fts} WHERE rowid = OLD.rowid;
                INSERT INTO {fts} (rowid, {columns}) VALUES (NEW.rowid, {new_values});
            END"
        );
        conn.execute(&update_trigger, [])?;

        let delete_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_ad AFTER DELETE ON {table} BEGIN
                DELETE FROM {fts} WHERE rowid = OLD.rowid;
            END"
        );
        conn.execute(&delete_trigger, [])?;

        debug!("Created FTS5 triggers for {}", fts);
        Ok(())
    }

    /// Populate the FTS5 mirror from the existing table contents.
    pub fn populate(&self, conn: &Connection) -> Result<()> {
        let fts = self.category.fts_table();
        let columns = self.category.text_columns().join(", ");

        conn.execute_batch(&format!("DELETE FROM {};", fts))?;
        conn.execute(
            &format!(
                "INSERT INTO {fts} (rowid, {columns}) SELECT rowid, {columns} FROM {}",
                self.category.table()
            ),
            [],
        )?;

        debug!("Populated {} from {}", fts, self.category.table());
        Ok(())
    }

    /// Rebuild the FTS5 index completely.
    pub fn rebuild(&self, conn: &Connection) -> Result<()> {
        let fts = self.category.fts_table();
        conn.execute(&format!("DROP TABLE IF EXISTS {}", fts), [])?;
        for suffix in ["ai", "au", "ad"] {
            conn.execute(&format!("DROP TRIGGER IF EXISTS {}_{}", fts, suffix), [])?;
        }

        self.create_table(conn)?;
        self.create_triggers(conn)?;
        self.populate(conn)?;

        info!("Rebuilt FTS5 index {}", fts);
        Ok(())
    }

    fn prefixed_columns(&self, prefix: &str) -> String {
        self.category
            .text_columns()
            .iter()
            .map(|c| format!("{}.{}", prefix, c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
