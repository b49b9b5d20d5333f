//! Key-value configuration surface and the sharing policy stored in it.

use crate::config::ConfigKeys;
use crate::error::{RecallError, Result};
use crate::models::{Category, SharingMode};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Per-instance key-value configuration.
///
/// Instance identity, sharing policy and the sensitive-lock list are all
/// persisted through this surface.
pub trait ConfigStore: Send + Sync {
    /// Get a raw value, or `None` if the key was never set.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value.
    fn set(&self, key: &str, value: &str, timestamp: DateTime<Utc>) -> Result<()>;

    fn get_or_default(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get(key)?.unwrap_or_else(|| default.to_string()))
    }

    fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(match self.get(key)?.as_deref().map(str::trim) {
            Some("true") | Some("1") | Some("yes") => true,
            Some("false") | Some("0") | Some("no") => false,
            _ => default,
        })
    }

    fn get_int(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self
            .get(key)?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }
}

/// What an instance shares with its peers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SharingSettings {
    pub mode: SharingMode,
    pub types: Vec<Category>,
}

impl SharingSettings {
    pub fn new(mode: SharingMode, types: impl IntoIterator<Item = Category>) -> Self {
        let mut types: Vec<Category> = types.into_iter().collect();
        types.sort();
        types.dedup();
        Self { mode, types }
    }

    /// Type names as written to the registry.
    pub fn type_names(&self) -> Vec<String> {
        self.types.iter().map(|c| c.as_str().to_string()).collect()
    }

    /// Load from config. Missing keys mean "share nothing".
    pub fn load<C: ConfigStore + ?Sized>(config: &C) -> Result<Self> {
        let mode = match config.get(ConfigKeys::SHARING_MODE)? {
            Some(raw) => SharingMode::from_str(&raw).unwrap_or_else(|| {
                warn!("Unrecognized sharing_mode '{}' in config, treating as none", raw);
                SharingMode::None
            }),
            None => SharingMode::None,
        };

        let types = match config.get(ConfigKeys::SHARING_TYPES)? {
            Some(raw) => parse_type_list(&raw),
            None => Vec::new(),
        };

        Ok(Self::new(mode, types))
    }

    /// Persist to config.
    pub fn save<C: ConfigStore + ?Sized>(&self, config: &C) -> Result<()> {
        let now = Utc::now();
        let types_json = serde_json::to_string(&self.type_names()).map_err(|e| {
            RecallError::Json {
                message: format!("Failed to serialize sharing types: {}", e),
                source: Some(e),
            }
        })?;
        config.set(ConfigKeys::SHARING_MODE, self.mode.as_str(), now)?;
        config.set(ConfigKeys::SHARING_TYPES, &types_json, now)?;
        Ok(())
    }
}

/// Accepts a JSON array or a comma-separated list; unknown names are dropped.
fn parse_type_list(raw: &str) -> Vec<Category> {
    let names: Vec<String> = serde_json::from_str(raw)
        .unwrap_or_else(|_| raw.split(',').map(|s| s.trim().to_string()).collect());

    names
        .iter()
        .filter(|n| !n.is_empty())
        .filter_map(|n| {
            let parsed = Category::from_str(n);
            if parsed.is_none() {
                warn!("Ignoring unknown sharing type '{}'", n);
            }
            parsed
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryConfig {
        values: Mutex<HashMap<String, String>>,
    }

    impl ConfigStore for MemoryConfig {
        fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str, _timestamp: DateTime<Utc>) -> Result<()> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_typed_getters_fall_back_to_defaults() {
        let config = MemoryConfig::default();
        config.set("flag", "yes", Utc::now()).unwrap();
        config.set("count", "12", Utc::now()).unwrap();
        config.set("broken", "twelve", Utc::now()).unwrap();

        assert!(config.get_bool("flag", false).unwrap());
        assert!(config.get_bool("missing", true).unwrap());
        assert_eq!(config.get_int("count", 0).unwrap(), 12);
        assert_eq!(config.get_int("broken", 5).unwrap(), 5);
        assert_eq!(config.get_or_default("missing", "x").unwrap(), "x");
    }

    #[test]
    fn test_sharing_defaults_to_none() {
        let config = MemoryConfig::default();
        let sharing = SharingSettings::load(&config).unwrap();
        assert_eq!(sharing.mode, SharingMode::None);
        assert!(sharing.types.is_empty());
    }

    #[test]
    fn test_sharing_save_and_load() {
        let config = MemoryConfig::default();
        let sharing = SharingSettings::new(
            SharingMode::Read,
            [Category::Tasks, Category::Decisions, Category::Tasks],
        );
        sharing.save(&config).unwrap();

        let loaded = SharingSettings::load(&config).unwrap();
        assert_eq!(loaded, sharing);
        assert_eq!(loaded.type_names(), vec!["decisions", "tasks"]);
    }

    #[test]
    fn test_sharing_types_accept_comma_list() {
        let config = MemoryConfig::default();
        config
            .set(ConfigKeys::SHARING_TYPES, "decisions, embeddings,tasks", Utc::now())
            .unwrap();

        let loaded = SharingSettings::load(&config).unwrap();
        assert_eq!(loaded.types, vec![Category::Decisions, Category::Tasks]);
    }
}
