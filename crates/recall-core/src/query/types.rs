//! Request and response types for cross-instance reads.

use crate::config::QueryConfig;
use crate::models::{Category, InstanceEntry, InstanceStats, InstanceStatus, SharingMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Options for a single-target query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Free-text search; `None` or blank lists the most recent records.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryOptions {
    pub fn search(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The search term, if any non-blank one was given.
    pub fn term(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    pub fn effective_limit(&self) -> usize {
        clamp_limit(self.limit)
    }
}

/// Options for a fan-out search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchAllOptions {
    pub scope: Category,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchAllOptions {
    pub fn new(scope: Category) -> Self {
        Self { scope, limit: None }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub(crate) fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(QueryConfig::DEFAULT_LIMIT)
        .clamp(1, QueryConfig::MAX_LIMIT)
}

/// Which instance a result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInstance {
    pub instance_id: String,
    pub label: String,
    pub project_root: PathBuf,
    pub status: InstanceStatus,
}

impl From<&InstanceEntry> for SourceInstance {
    fn from(entry: &InstanceEntry) -> Self {
        Self {
            instance_id: entry.instance_id.clone(),
            label: entry.label.clone(),
            project_root: entry.project_root.clone(),
            status: entry.status,
        }
    }
}

/// Rows read from one peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub source: SourceInstance,
    pub category: Category,
    pub rows: Vec<Map<String, Value>>,
}

/// Raw records extracted for import into the local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportPayload {
    pub source: SourceInstance,
    pub category: Category,
    pub records: Vec<Map<String, Value>>,
    /// Records matched but hidden by the owner's sensitive locks.
    pub withheld: usize,
}

/// Registry metadata about a peer, without touching its store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatsView {
    pub instance_id: String,
    pub label: String,
    pub status: InstanceStatus,
    pub sharing_mode: SharingMode,
    pub sharing_types: Vec<String>,
    pub stats: InstanceStats,
    pub schema_version: u32,
    pub server_version: String,
    pub last_heartbeat: DateTime<Utc>,
}

impl From<InstanceEntry> for InstanceStatsView {
    fn from(entry: InstanceEntry) -> Self {
        Self {
            instance_id: entry.instance_id,
            label: entry.label,
            status: entry.status,
            sharing_mode: entry.sharing_mode,
            sharing_types: entry.sharing_types,
            stats: entry.stats,
            schema_version: entry.schema_version,
            server_version: entry.server_version,
            last_heartbeat: entry.last_heartbeat,
        }
    }
}
