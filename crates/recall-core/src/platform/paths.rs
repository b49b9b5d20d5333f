//! Platform-specific path and identity utilities.

use crate::config::{RegistryConfig, StoreConfig};
use crate::error::{RecallError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Get the Recall global configuration directory.
///
/// This is the well-known location for cross-process shared state like the
/// instance registry.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/recall` (XDG_CONFIG_HOME)
/// - **Windows**: `%APPDATA%\recall`
/// - **macOS**: `~/Library/Application Support/recall`
pub fn recall_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| RecallError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir.join(RegistryConfig::APP_CONFIG_DIR_NAME))
}

/// Get the path to the shared instance registry document.
///
/// Returns `{recall_config_dir}/instances.json`.
pub fn registry_path() -> Result<PathBuf> {
    Ok(recall_config_dir()?.join(RegistryConfig::REGISTRY_FILENAME))
}

/// Default location of a project's memory store: `{project_root}/.recall/memory.db`.
pub fn default_store_path(project_root: &Path) -> PathBuf {
    project_root
        .join(StoreConfig::DEFAULT_STORE_DIR)
        .join(StoreConfig::DEFAULT_STORE_FILENAME)
}

/// Stable identifier of the local machine.
///
/// Uses the systemd/dbus machine id when present, otherwise a SHA-256 of the
/// hostname. Entries carrying a different machine id were written from
/// another host sharing the config directory, and their pids mean nothing here.
pub fn machine_id() -> String {
    #[cfg(target_os = "linux")]
    {
        for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(contents) = std::fs::read_to_string(candidate) {
                let id = contents.trim();
                if !id.is_empty() {
                    return id.to_string();
                }
            }
        }
    }

    match sysinfo::System::host_name() {
        Some(host) if !host.is_empty() => hash_identifier(&host),
        _ => {
            debug!("No machine id or hostname available, using placeholder");
            "unknown".to_string()
        }
    }
}

fn hash_identifier(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..16])
}
