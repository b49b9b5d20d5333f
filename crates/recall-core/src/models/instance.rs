//! Registry document types.

use super::category::{Category, SharingMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Liveness of a registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Active,
    Stopped,
    /// Also used for unrecognised status strings.
    #[serde(other)]
    Stale,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Stale => "stale",
            InstanceStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-category record counts plus on-disk store size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStats {
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub size_bytes: u64,
}

impl InstanceStats {
    pub fn count(&self, category: Category) -> u64 {
        self.counts.get(category.as_str()).copied().unwrap_or(0)
    }
}

/// One instance in the shared registry, keyed by `instance_id`.
///
/// Every field defaults when absent so that entries written by older or newer
/// peers still load; fields this version does not know are kept in `extra`
/// and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceEntry {
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub project_root: PathBuf,
    #[serde(default)]
    pub store_path: PathBuf,
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub server_version: String,
    #[serde(default)]
    pub sharing_mode: SharingMode,
    #[serde(default)]
    pub sharing_types: Vec<String>,
    #[serde(default)]
    pub stats: InstanceStats,
    #[serde(default)]
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub machine_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InstanceEntry {
    /// Whether `category` is listed in this instance's shared types.
    ///
    /// This only inspects the type list; callers combine it with the sharing
    /// mode through the permission checks.
    pub fn shares(&self, category: Category) -> bool {
        self.sharing_types
            .iter()
            .any(|t| Category::from_str(t) == Some(category))
    }

    /// Time elapsed since the last heartbeat. Future timestamps count as zero.
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_heartbeat).to_std().unwrap_or(Duration::ZERO)
    }
}

/// The shared registry document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub machine_id: String,
    #[serde(default)]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RegistryDocument {
    pub fn empty(machine_id: impl Into<String>) -> Self {
        Self {
            schema_version: crate::config::RegistryConfig::SCHEMA_VERSION,
            machine_id: machine_id.into(),
            last_updated: Utc::now(),
            instances: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_preserves_unknown_fields() {
        let json = r#"{
            "instance_id": "a",
            "label": "alpha",
            "sharing_mode": "read",
            "sharing_types": ["decisions"],
            "last_heartbeat": "2026-01-01T00:00:00Z",
            "future_field": {"nested": true}
        }"#;

        let entry: InstanceEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.sharing_mode, SharingMode::Read);
        assert!(entry.shares(Category::Decisions));
        assert!(!entry.shares(Category::Tasks));

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["future_field"]["nested"], serde_json::json!(true));
    }

    #[test]
    fn test_entry_with_missing_fields_loads() {
        let entry: InstanceEntry = serde_json::from_str(r#"{"instance_id": "b"}"#).unwrap();
        assert_eq!(entry.sharing_mode, SharingMode::None);
        assert_eq!(entry.pid, None);
        assert_eq!(entry.status, InstanceStatus::Active);
    }

    #[test]
    fn test_heartbeat_age_clamps_future() {
        let mut entry: InstanceEntry = serde_json::from_str(r#"{"instance_id": "c"}"#).unwrap();
        let now = Utc::now();
        entry.last_heartbeat = now + chrono::Duration::seconds(30);
        assert_eq!(entry.heartbeat_age(now), Duration::ZERO);
    }
}
