//! Persistent identity of the local instance.

use crate::config::ConfigKeys;
use crate::platform;
use crate::store::ConfigStore;
use crate::{RecallError, Result};
use chrono::Utc;
use std::path::Path;
use tracing::info;

/// Who this process is in the shared registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Stable UUID, created once per store and never reused.
    pub instance_id: String,
    /// Label used when none is configured.
    pub default_label: String,
    pub machine_id: String,
}

impl LocalIdentity {
    /// Load the instance id from config, minting and persisting one on first use.
    pub fn resolve<C: ConfigStore + ?Sized>(config: &C, project_root: &Path) -> Result<Self> {
        let instance_id = match config.get(ConfigKeys::INSTANCE_ID)? {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                config.set(ConfigKeys::INSTANCE_ID, &id, Utc::now())?;
                info!("Assigned new instance id {}", id);
                id
            }
        };

        Ok(Self {
            instance_id,
            default_label: default_label(project_root),
            machine_id: platform::machine_id(),
        })
    }

    /// The configured label, falling back to the project directory name.
    pub fn label<C: ConfigStore + ?Sized>(&self, config: &C) -> Result<String> {
        match config.get(ConfigKeys::INSTANCE_LABEL)? {
            Some(label) if !label.trim().is_empty() => Ok(label),
            _ => Ok(self.default_label.clone()),
        }
    }

    /// Persist a new label.
    pub fn set_label<C: ConfigStore + ?Sized>(&self, config: &C, label: &str) -> Result<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(RecallError::Validation {
                field: "label".to_string(),
                message: "Label cannot be empty".to_string(),
            });
        }
        config.set(ConfigKeys::INSTANCE_LABEL, label, Utc::now())
    }
}

fn default_label(project_root: &Path) -> String {
    project_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "recall".to_string())
}
