//! The per-record lock list stored under the `sensitive_locks` config key.

use crate::models::Category;
use crate::{RecallError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Serialized form: `[{"type": "decisions", "ids": ["42"]}, ...]`.
#[derive(Debug, Serialize, Deserialize)]
struct LockGroup {
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    ids: Vec<serde_json::Value>,
}

/// Locked record ids grouped by record type.
///
/// Types are kept as strings so that groups written for record types this
/// version does not query survive a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockSet {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl LockSet {
    /// Parse the stored value. Absent or blank means nothing is locked; a
    /// malformed value is an error rather than an empty set.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::default()),
            Some(raw) => raw,
        };

        let parsed: Vec<LockGroup> = serde_json::from_str(raw).map_err(|e| RecallError::Json {
            message: format!("Malformed sensitive lock list: {}", e),
            source: Some(e),
        })?;

        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for group in parsed {
            let ids = group.ids.into_iter().filter_map(|id| match id {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            groups.entry(group.record_type).or_default().extend(ids);
        }
        groups.retain(|_, ids| !ids.is_empty());
        Ok(Self { groups })
    }

    pub fn to_json(&self) -> Result<String> {
        let groups: Vec<LockGroup> = self
            .groups
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(record_type, ids)| LockGroup {
                record_type: record_type.clone(),
                ids: ids.iter().cloned().map(serde_json::Value::String).collect(),
            })
            .collect();
        Ok(serde_json::to_string(&groups)?)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Add ids; returns how many were not already locked.
    pub fn lock<I, S>(&mut self, category: Category, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = self.groups.entry(category.as_str().to_string()).or_default();
        let added = ids
            .into_iter()
            .filter(|id| set.insert(id.as_ref().to_string()))
            .count();
        if set.is_empty() {
            self.groups.remove(category.as_str());
        }
        added
    }

    /// Remove ids; returns how many were actually locked.
    pub fn unlock<I, S>(&mut self, category: Category, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(set) = self.groups.get_mut(category.as_str()) else {
            return 0;
        };
        let removed = ids
            .into_iter()
            .filter(|id| set.remove(id.as_ref()))
            .count();
        if set.is_empty() {
            self.groups.remove(category.as_str());
        }
        removed
    }

    pub fn is_locked(&self, category: Category, id: &str) -> bool {
        self.groups
            .get(category.as_str())
            .is_some_and(|ids| ids.contains(id))
    }

    pub fn ids(&self, category: Category) -> BTreeSet<String> {
        self.groups
            .get(category.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// Locked id count per stored type, unknown types included.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.groups
            .iter()
            .map(|(t, ids)| (t.clone(), ids.len()))
            .collect()
    }
}
