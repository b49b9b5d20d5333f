//! Queryable categories and sharing modes.

use crate::error::{RecallError, Result};
use serde::{Deserialize, Serialize};

/// A category of records another instance may be allowed to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sessions,
    Decisions,
    Tasks,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Sessions, Category::Decisions, Category::Tasks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sessions => "sessions",
            Category::Decisions => "decisions",
            Category::Tasks => "tasks",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sessions" | "session" => Some(Category::Sessions),
            "decisions" | "decision" => Some(Category::Decisions),
            "tasks" | "task" => Some(Category::Tasks),
            _ => None,
        }
    }

    /// Parse a category name, failing with `InvalidCategory` for anything
    /// outside the queryable set.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| RecallError::InvalidCategory(s.to_string()))
    }

    /// Backing table in the store.
    pub fn table(&self) -> &'static str {
        self.as_str()
    }

    /// FTS5 mirror of the backing table.
    pub fn fts_table(&self) -> &'static str {
        match self {
            Category::Sessions => "sessions_fts",
            Category::Decisions => "decisions_fts",
            Category::Tasks => "tasks_fts",
        }
    }

    /// Free-text columns indexed by FTS5 and scanned by the substring fallback.
    pub fn text_columns(&self) -> &'static [&'static str] {
        match self {
            Category::Sessions => &["name", "summary"],
            Category::Decisions => &["title", "decision", "rationale"],
            Category::Tasks => &["title", "description"],
        }
    }

    /// Column used to order listings newest first.
    pub fn recency_column(&self) -> &'static str {
        match self {
            Category::Sessions => "started_at",
            Category::Decisions => "created_at",
            Category::Tasks => "updated_at",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much of its data an instance lets others read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharingMode {
    /// Shared categories are queryable.
    Read,
    /// Shared categories are queryable and may be extracted for import.
    Full,
    /// Nothing is queryable. Unrecognized modes from newer peers land here.
    #[default]
    #[serde(other)]
    None,
}

impl SharingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharingMode::None => "none",
            SharingMode::Read => "read",
            SharingMode::Full => "full",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(SharingMode::None),
            "read" => Some(SharingMode::Read),
            "full" => Some(SharingMode::Full),
            _ => None,
        }
    }

    pub fn allows_read(&self) -> bool {
        matches!(self, SharingMode::Read | SharingMode::Full)
    }

    pub fn allows_import(&self) -> bool {
        matches!(self, SharingMode::Full)
    }
}

impl std::fmt::Display for SharingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
