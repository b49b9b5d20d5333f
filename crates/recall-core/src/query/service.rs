//! Permissioned reads of peer stores.

use super::handles::PeerHandleCache;
use super::permissions::{check_import_permission, check_permission};
use super::scoped::{read_by_ids, read_records};
use super::types::{
    clamp_limit, ImportPayload, InstanceStatsView, QueryOptions, QueryResult, SearchAllOptions,
    SourceInstance,
};
use crate::config::{CoordinationSettings, QueryConfig};
use crate::models::{Category, InstanceEntry};
use crate::registry::InstanceRegistry;
use crate::sensitive::SensitivityPolicy;
use crate::timer::PeriodicTask;
use crate::{RecallError, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Reads other instances' stores within the limits each owner publishes.
///
/// Every read path applies the owner's sensitive locks (minus the owner's
/// approvals for this instance) before returning records.
pub struct CrossInstanceQuery {
    registry: Arc<InstanceRegistry>,
    handles: PeerHandleCache,
    settings: CoordinationSettings,
    sweeper: Mutex<Option<PeriodicTask>>,
}

impl CrossInstanceQuery {
    pub fn new(registry: Arc<InstanceRegistry>, settings: CoordinationSettings) -> Self {
        let handles = PeerHandleCache::new(
            settings.max_handles,
            settings.handle_ttl,
            settings.busy_timeout,
        );
        Self {
            registry,
            handles,
            settings,
            sweeper: Mutex::new(None),
        }
    }

    pub fn handles(&self) -> &PeerHandleCache {
        &self.handles
    }

    /// Instances visible for querying.
    pub fn discover_instances(&self, include_stale: bool) -> Vec<InstanceEntry> {
        self.registry.list_instances(include_stale)
    }

    fn lookup(&self, instance_id: &str) -> Result<InstanceEntry> {
        self.registry
            .get_instance(instance_id)
            .ok_or_else(|| RecallError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    // ========================================
    // Single-target reads
    // ========================================

    /// Query one category of another instance.
    pub fn query(
        &self,
        instance_id: &str,
        category: &str,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let entry = self.lookup(instance_id)?;
        let category = check_permission(&entry, category)?;
        self.query_entry(&entry, category, options)
    }

    pub fn query_sessions(&self, instance_id: &str, options: &QueryOptions) -> Result<QueryResult> {
        self.query(instance_id, Category::Sessions.as_str(), options)
    }

    pub fn query_decisions(&self, instance_id: &str, options: &QueryOptions) -> Result<QueryResult> {
        self.query(instance_id, Category::Decisions.as_str(), options)
    }

    pub fn query_tasks(&self, instance_id: &str, options: &QueryOptions) -> Result<QueryResult> {
        self.query(instance_id, Category::Tasks.as_str(), options)
    }

    fn query_entry(
        &self,
        entry: &InstanceEntry,
        category: Category,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let limit = options.effective_limit();
        let term = options.term();

        let rows = self.with_peer(entry, |conn| {
            let policy = SensitivityPolicy::load(conn, category, self.registry.instance_id())?;
            let fetch = limit + policy.hidden_count();
            let mut rows = policy.apply(read_records(conn, category, term, fetch)?);
            rows.truncate(limit);
            Ok(rows)
        })?;

        debug!(
            "Query {} on {} returned {} row(s)",
            category,
            entry.instance_id,
            rows.len()
        );
        Ok(QueryResult {
            source: SourceInstance::from(entry),
            category,
            rows,
        })
    }

    /// Run `f` on a cached read-only handle to `entry`'s store.
    ///
    /// A failure to open is reported as an unavailable peer; a failed read
    /// drops the cached handle so the next call reopens it.
    fn with_peer<T>(
        &self,
        entry: &InstanceEntry,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let unavailable = |message: String| RecallError::UnavailablePeer {
            instance_id: entry.instance_id.clone(),
            store_path: entry.store_path.clone(),
            message,
        };

        let handle = self
            .handles
            .get_or_open(&entry.store_path)
            .map_err(|e| unavailable(e.to_string()))?;
        let conn = handle
            .lock()
            .map_err(|_| unavailable("peer handle lock poisoned".to_string()))?;

        let result = f(&conn);
        if result.is_err() {
            drop(conn);
            self.handles.evict(&entry.store_path);
        }
        result
    }

    // ========================================
    // Fan-out
    // ========================================

    /// Run the same search against every active peer sharing `options.scope`.
    ///
    /// Peers that fail are logged and skipped; peers with no matches are
    /// omitted.
    pub fn search_all(&self, query: &str, options: &SearchAllOptions) -> Vec<QueryResult> {
        let own_id = self.registry.instance_id();
        let query_options = QueryOptions {
            query: Some(query.to_string()),
            limit: Some(clamp_limit(options.limit)),
        };

        let peers: Vec<InstanceEntry> = self
            .discover_instances(false)
            .into_iter()
            .filter(|entry| entry.instance_id != own_id)
            .filter(|entry| entry.sharing_mode.allows_read() && entry.shares(options.scope))
            .collect();

        let mut results = Vec::new();
        for peer in &peers {
            match self.query_entry(peer, options.scope, &query_options) {
                Ok(result) if !result.rows.is_empty() => results.push(result),
                Ok(_) => {}
                Err(e) => warn!(
                    "Skipping {} ({}) in search: {}",
                    peer.label, peer.instance_id, e
                ),
            }
        }

        info!(
            "Searched {} across {} peer(s), {} with matches",
            options.scope,
            peers.len(),
            results.len()
        );
        results
    }

    // ========================================
    // Import
    // ========================================

    /// Pull raw records from a peer that shares with `full` mode.
    ///
    /// With `ids`, returns exactly those records that exist and are visible;
    /// without, returns the most recent records up to a fixed maximum.
    pub fn extract_for_import(
        &self,
        instance_id: &str,
        category: &str,
        ids: Option<&[String]>,
    ) -> Result<ImportPayload> {
        let entry = self.lookup(instance_id)?;
        let category = check_import_permission(&entry, category)?;

        let (records, withheld) = self.with_peer(&entry, |conn| {
            let policy = SensitivityPolicy::load(conn, category, self.registry.instance_id())?;
            let limit = QueryConfig::MAX_EXTRACT_ROWS;
            let raw = read_by_ids(conn, category, ids, limit + policy.hidden_count())?;
            let matched = raw.len();
            let mut records = policy.apply(raw);
            let withheld = matched - records.len();
            records.truncate(limit);
            Ok((records, withheld))
        })?;

        info!(
            "Extracted {} {} record(s) from {} ({} withheld)",
            records.len(),
            category,
            entry.instance_id,
            withheld
        );
        Ok(ImportPayload {
            source: SourceInstance::from(&entry),
            category,
            records,
            withheld,
        })
    }

    /// Registry metadata for one instance. Never opens its store.
    pub fn get_instance_stats(&self, instance_id: &str) -> Result<InstanceStatsView> {
        Ok(self.lookup(instance_id)?.into())
    }

    // ========================================
    // Handle maintenance
    // ========================================

    pub fn sweep_expired(&self) -> usize {
        self.handles.sweep_expired()
    }

    pub fn close_all(&self) -> usize {
        let closed = self.handles.close_all();
        if closed > 0 {
            debug!("Closed {} peer handle(s)", closed);
        }
        closed
    }

    /// Start periodically sweeping expired handles.
    pub fn start_sweeper(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        let task = PeriodicTask::spawn("handle sweeper", self.settings.sweep_interval, move || {
            match weak.upgrade() {
                Some(query) => {
                    query.sweep_expired();
                    true
                }
                None => false,
            }
        })?;

        if let Ok(mut slot) = self.sweeper.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    pub fn stop_sweeper(&self) {
        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(mut task) = slot.take() {
                task.stop();
            }
        }
    }
}

impl Drop for CrossInstanceQuery {
    fn drop(&mut self) {
        self.stop_sweeper();
        self.handles.close_all();
    }
}
