//! Owner-side sensitive data service and the requester-side filter policy.

use super::locks::LockSet;
use super::requests;
use crate::config::ConfigKeys;
use crate::models::{AccessRequestStatus, Category, SensitiveAccessRequest};
use crate::store::rows::record_id;
use crate::store::{ConfigStore, LocalStore};
use crate::{RecallError, Result};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Locked-record counts per type plus the number of unresolved requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SensitiveSummary {
    pub locked: BTreeMap<String, usize>,
    pub total_locked: usize,
    pub pending_requests: u64,
}

/// Locks and access requests for the local instance's own records.
pub struct SensitiveDataService {
    store: LocalStore,
    /// Serializes read-modify-write of the lock list within this process.
    lock_guard: Mutex<()>,
}

impl SensitiveDataService {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            lock_guard: Mutex::new(()),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock_guard.lock().map_err(|_| {
            RecallError::Other("Failed to acquire sensitive lock guard".to_string())
        })
    }

    fn load_locks(&self) -> Result<LockSet> {
        let raw = self.store.get(ConfigKeys::SENSITIVE_LOCKS)?;
        LockSet::parse(raw.as_deref())
    }

    fn modify_locks(&self, f: impl FnOnce(&mut LockSet) -> usize) -> Result<usize> {
        let _guard = self.guard()?;
        let mut locks = self.load_locks()?;
        let changed = f(&mut locks);
        if changed > 0 {
            self.store
                .set(ConfigKeys::SENSITIVE_LOCKS, &locks.to_json()?, Utc::now())?;
        }
        Ok(changed)
    }

    // ========================================
    // Locks
    // ========================================

    /// Hide records from peers. Returns how many ids were newly locked.
    pub fn lock_records<S: AsRef<str>>(&self, category: Category, ids: &[S]) -> Result<usize> {
        let added = self.modify_locks(|locks| locks.lock(category, ids))?;
        info!("Locked {} {} record(s)", added, category);
        Ok(added)
    }

    /// Make records visible again. Returns how many ids were actually locked.
    pub fn unlock_records<S: AsRef<str>>(&self, category: Category, ids: &[S]) -> Result<usize> {
        let removed = self.modify_locks(|locks| locks.unlock(category, ids))?;
        info!("Unlocked {} {} record(s)", removed, category);
        Ok(removed)
    }

    pub fn is_locked(&self, category: Category, id: &str) -> Result<bool> {
        Ok(self.load_locks()?.is_locked(category, id))
    }

    pub fn get_locked_ids(&self, category: Category) -> Result<Vec<String>> {
        Ok(self.load_locks()?.ids(category).into_iter().collect())
    }

    pub fn get_summary(&self) -> Result<SensitiveSummary> {
        let locked = self.load_locks()?.counts();
        let pending_requests = self.store.with_connection(requests::count_pending)?;
        Ok(SensitiveSummary {
            total_locked: locked.values().sum(),
            locked,
            pending_requests,
        })
    }

    /// Drop every record whose id is locked for `category`.
    pub fn filter_sensitive(
        &self,
        category: Category,
        records: Vec<Map<String, Value>>,
    ) -> Result<Vec<Map<String, Value>>> {
        let locked = self.load_locks()?.ids(category);
        Ok(retain_visible(records, &locked, &BTreeSet::new()))
    }

    // ========================================
    // Access requests
    // ========================================

    pub fn create_access_request<S: AsRef<str>>(
        &self,
        requester_instance_id: &str,
        requester_label: &str,
        target_type: Category,
        target_ids: &[S],
        reason: Option<&str>,
    ) -> Result<SensitiveAccessRequest> {
        let mut target_ids: Vec<String> = target_ids
            .iter()
            .map(|id| {
                let id: &str = id.as_ref();
                id.trim().to_string()
            })
            .filter(|id| !id.is_empty())
            .collect();
        target_ids.sort();
        target_ids.dedup();
        if target_ids.is_empty() {
            return Err(RecallError::Validation {
                field: "target_ids".to_string(),
                message: "At least one record id is required".to_string(),
            });
        }

        let request = SensitiveAccessRequest {
            id: uuid::Uuid::new_v4().to_string(),
            requester_instance_id: requester_instance_id.to_string(),
            requester_label: requester_label.to_string(),
            target_type,
            target_ids,
            reason: reason.map(str::to_string),
            status: AccessRequestStatus::Pending,
            requested_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        };
        self.store
            .with_connection(|conn| requests::insert(conn, &request))?;

        info!(
            "Access request {} from {} for {} {} record(s)",
            request.id,
            request.requester_label,
            request.target_ids.len(),
            request.target_type
        );
        Ok(request)
    }

    pub fn approve_request(&self, id: &str, resolved_by: &str) -> Result<SensitiveAccessRequest> {
        self.resolve(id, AccessRequestStatus::Approved, resolved_by)
    }

    pub fn deny_request(&self, id: &str, resolved_by: &str) -> Result<SensitiveAccessRequest> {
        self.resolve(id, AccessRequestStatus::Denied, resolved_by)
    }

    fn resolve(
        &self,
        id: &str,
        status: AccessRequestStatus,
        resolved_by: &str,
    ) -> Result<SensitiveAccessRequest> {
        let (changed, request) = self.store.with_connection(|conn| {
            let changed = requests::resolve(conn, id, status, resolved_by, Utc::now())?;
            Ok((changed, requests::get(conn, id)?))
        })?;

        let request = request.ok_or_else(|| RecallError::AccessRequestNotFound {
            id: id.to_string(),
        })?;
        if changed {
            info!("Access request {} {} by {}", id, status.as_str(), resolved_by);
        } else {
            debug!(
                "Access request {} already {}, leaving unchanged",
                id,
                request.status.as_str()
            );
        }
        Ok(request)
    }

    pub fn get_access_request(&self, id: &str) -> Result<Option<SensitiveAccessRequest>> {
        self.store.with_connection(|conn| requests::get(conn, id))
    }

    pub fn list_access_requests(
        &self,
        status: Option<AccessRequestStatus>,
    ) -> Result<Vec<SensitiveAccessRequest>> {
        self.store.with_connection(|conn| requests::list(conn, status))
    }

    /// Whether `requester`'s approved requests for `category` cover every id.
    /// An empty id list is never approved.
    pub fn is_access_approved<S: AsRef<str>>(
        &self,
        requester: &str,
        category: Category,
        ids: &[S],
    ) -> Result<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        let approved = self
            .store
            .with_connection(|conn| requests::approved_ids(conn, requester, category))?;
        Ok(ids.iter().all(|id| {
            let id: &str = id.as_ref();
            approved.contains(id)
        }))
    }
}

/// What a given requester may see of one category in a peer's store.
///
/// Built from the peer's own lock list and the peer's approved requests for
/// the requester, both read through the requester's handle on that store.
#[derive(Debug, Clone, Default)]
pub struct SensitivityPolicy {
    locked: BTreeSet<String>,
    approved: BTreeSet<String>,
}

impl SensitivityPolicy {
    pub fn load(conn: &Connection, category: Category, requester: &str) -> Result<Self> {
        let locked = requests::load_locks(conn)?.ids(category);
        let approved = if locked.is_empty() {
            BTreeSet::new()
        } else {
            requests::approved_ids(conn, requester, category)?
        };
        Ok(Self { locked, approved })
    }

    /// Number of records this policy hides, used to over-fetch a page.
    pub fn hidden_count(&self) -> usize {
        self.locked.difference(&self.approved).count()
    }

    pub fn is_visible(&self, id: &str) -> bool {
        !self.locked.contains(id) || self.approved.contains(id)
    }

    pub fn apply(&self, records: Vec<Map<String, Value>>) -> Vec<Map<String, Value>> {
        retain_visible(records, &self.locked, &self.approved)
    }
}

fn retain_visible(
    records: Vec<Map<String, Value>>,
    locked: &BTreeSet<String>,
    approved: &BTreeSet<String>,
) -> Vec<Map<String, Value>> {
    if locked.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| match record_id(record) {
            Some(id) => !locked.contains(&id) || approved.contains(&id),
            None => true,
        })
        .collect()
}
