//! Sensitive-data access request types.

use super::category::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolution state of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRequestStatus {
    Pending,
    Approved,
    Denied,
}

impl AccessRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRequestStatus::Pending => "pending",
            AccessRequestStatus::Approved => "approved",
            AccessRequestStatus::Denied => "denied",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AccessRequestStatus::Pending),
            "approved" => Some(AccessRequestStatus::Approved),
            "denied" => Some(AccessRequestStatus::Denied),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, AccessRequestStatus::Pending)
    }
}

/// A requester's ticket for visibility into specific locked records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitiveAccessRequest {
    pub id: String,
    pub requester_instance_id: String,
    pub requester_label: String,
    pub target_type: Category,
    pub target_ids: Vec<String>,
    pub reason: Option<String>,
    pub status: AccessRequestStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}
