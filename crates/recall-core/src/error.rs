//! Error types for Recall.
//!
//! Discovery failures never surface through this type: the registry absorbs
//! them and degrades to an empty view. Everything a caller of a direct
//! cross-instance query can act on (unknown target, denied scope, unreadable
//! peer store) has its own variant.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a peer refused a cross-instance read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The peer's sharing mode is `none`.
    SharingDisabled,
    /// The category is queryable in general but the peer does not share it.
    CategoryNotShared {
        category: String,
        shared: Vec<String>,
    },
    /// Import needs `full` sharing; the peer only grants the given mode.
    ImportRequiresFull { mode: String },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::SharingDisabled => {
                write!(f, "sharing is disabled on this instance (sharing_mode=none)")
            }
            DenialReason::CategoryNotShared { category, shared } => {
                if shared.is_empty() {
                    write!(f, "category '{}' is not shared (no categories are shared)", category)
                } else {
                    write!(
                        f,
                        "category '{}' is not shared (shared categories: {})",
                        category,
                        shared.join(", ")
                    )
                }
            }
            DenialReason::ImportRequiresFull { mode } => write!(
                f,
                "import requires sharing_mode=full (instance grants sharing_mode={})",
                mode
            ),
        }
    }
}

/// Main error type for Recall.
#[derive(Debug, Error)]
pub enum RecallError {
    // Cross-instance errors
    #[error("Instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("Permission denied by instance {instance_id}: {reason}")]
    PermissionDenied {
        instance_id: String,
        reason: DenialReason,
    },

    #[error("Unknown category '{0}' (queryable categories: sessions, decisions, tasks)")]
    InvalidCategory(String),

    #[error("Peer store unavailable for {instance_id} at {store_path:?}: {message}")]
    UnavailablePeer {
        instance_id: String,
        store_path: PathBuf,
        message: String,
    },

    // Sensitive data errors
    #[error("Access request not found: {id}")]
    AccessRequestNotFound { id: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Recall operations.
pub type Result<T> = std::result::Result<T, RecallError>;

impl From<std::io::Error> for RecallError {
    fn from(err: std::io::Error) -> Self {
        RecallError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RecallError {
    fn from(err: serde_json::Error) -> Self {
        RecallError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for RecallError {
    fn from(err: rusqlite::Error) -> Self {
        RecallError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RecallError {
    /// Shorthand for a permission denial.
    pub fn denied(instance_id: impl Into<String>, reason: DenialReason) -> Self {
        RecallError::PermissionDenied {
            instance_id: instance_id.into(),
            reason,
        }
    }

    /// Convert to a JSON-RPC error code for the request dispatcher.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Peer store unavailable
    /// - -32002: Instance or access request not found
    /// - -32003: Permission denied
    /// - -32005: Validation error
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            RecallError::UnavailablePeer { .. } => -32000,

            RecallError::InstanceNotFound { .. } | RecallError::AccessRequestNotFound { .. } => {
                -32002
            }

            RecallError::PermissionDenied { .. } => -32003,

            RecallError::InvalidCategory(_) | RecallError::Validation { .. } => -32005,

            _ => -32603,
        }
    }

    /// Check if this error may clear up on its own (peer busy or restarting).
    pub fn is_retryable(&self) -> bool {
        match self {
            RecallError::UnavailablePeer { .. } => true,
            RecallError::Database {
                source: Some(rusqlite::Error::SqliteFailure(err, _)),
                ..
            } => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
