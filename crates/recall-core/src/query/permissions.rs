//! Sharing permission checks against a peer's registry entry.

use crate::error::DenialReason;
use crate::models::{Category, InstanceEntry, SharingMode};
use crate::{RecallError, Result};

/// Check that `entry` lets peers read `category`, returning the parsed
/// category.
///
/// Checked in order: sharing disabled, unknown category, category not shared.
pub fn check_permission(entry: &InstanceEntry, category: &str) -> Result<Category> {
    if !entry.sharing_mode.allows_read() {
        return Err(RecallError::denied(
            &entry.instance_id,
            DenialReason::SharingDisabled,
        ));
    }

    let category = Category::parse(category)?;
    if !entry.shares(category) {
        return Err(RecallError::denied(
            &entry.instance_id,
            DenialReason::CategoryNotShared {
                category: category.as_str().to_string(),
                shared: entry.sharing_types.clone(),
            },
        ));
    }

    Ok(category)
}

/// Like `check_permission`, and additionally require `full` sharing.
pub fn check_import_permission(entry: &InstanceEntry, category: &str) -> Result<Category> {
    let category = check_permission(entry, category)?;
    if entry.sharing_mode != SharingMode::Full {
        return Err(RecallError::denied(
            &entry.instance_id,
            DenialReason::ImportRequiresFull {
                mode: entry.sharing_mode.as_str().to_string(),
            },
        ));
    }
    Ok(category)
}
