//! Shared JSON registry of running instances.
//!
//! Every instance on the machine reads and rewrites the same document. Writes
//! go through a temp file and a rename so readers never observe a partial
//! document; concurrent writers resolve last-write-wins. Read failures are
//! never fatal: a missing or corrupt file is treated as an empty registry.

use super::identity::LocalIdentity;
use crate::config::{CoordinationSettings, RegistryConfig};
use crate::models::{Category, InstanceEntry, InstanceStatus, RegistryDocument, SharingMode};
use crate::platform;
use crate::store::{atomic_read_json, atomic_write_json, LocalStore, SharingSettings};
use crate::timer::PeriodicTask;
use crate::{RecallError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Derive the live status of `entry` as seen from this machine.
///
/// Explicit shutdown wins; then a dead (or missing) pid; then heartbeat age.
/// Entries recorded on another machine cannot be probed, so only their
/// heartbeat age counts.
pub fn derive_status(
    entry: &InstanceEntry,
    now: DateTime<Utc>,
    local_machine_id: &str,
    stale_threshold: Duration,
) -> InstanceStatus {
    derive_status_with(
        entry,
        now,
        local_machine_id,
        stale_threshold,
        platform::is_process_alive,
    )
}

fn derive_status_with(
    entry: &InstanceEntry,
    now: DateTime<Utc>,
    local_machine_id: &str,
    stale_threshold: Duration,
    is_alive: impl Fn(u32) -> bool,
) -> InstanceStatus {
    if entry.status == InstanceStatus::Stopped {
        return InstanceStatus::Stopped;
    }

    let same_machine = entry.machine_id.is_empty() || entry.machine_id == local_machine_id;
    if same_machine {
        match entry.pid {
            Some(pid) if is_alive(pid) => {}
            _ => return InstanceStatus::Stopped,
        }
    } else if entry.pid.is_none() {
        return InstanceStatus::Stopped;
    }

    if entry.heartbeat_age(now) > stale_threshold {
        InstanceStatus::Stale
    } else {
        InstanceStatus::Active
    }
}

/// The local instance's view of, and presence in, the shared registry.
pub struct InstanceRegistry {
    registry_path: PathBuf,
    project_root: PathBuf,
    store: LocalStore,
    identity: LocalIdentity,
    settings: CoordinationSettings,
    /// Serializes read-modify-write cycles within this process.
    write_guard: Mutex<()>,
    heartbeat_task: Mutex<Option<PeriodicTask>>,
    /// Set by `shutdown`, cleared by `register`.
    stopped: AtomicBool,
}

impl InstanceRegistry {
    /// Use the registry at the per-user default location.
    pub fn open(
        project_root: impl Into<PathBuf>,
        store: LocalStore,
        identity: LocalIdentity,
        settings: CoordinationSettings,
    ) -> Result<Self> {
        let registry_path = platform::registry_path()?;
        Ok(Self::open_at(
            registry_path,
            project_root,
            store,
            identity,
            settings,
        ))
    }

    /// Use the registry file at `registry_path`. The file is created lazily on
    /// the first write.
    pub fn open_at(
        registry_path: impl Into<PathBuf>,
        project_root: impl Into<PathBuf>,
        store: LocalStore,
        identity: LocalIdentity,
        settings: CoordinationSettings,
    ) -> Self {
        Self {
            registry_path: registry_path.into(),
            project_root: project_root.into(),
            store,
            identity,
            settings,
            write_guard: Mutex::new(()),
            heartbeat_task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.registry_path
    }

    pub fn instance_id(&self) -> &str {
        &self.identity.instance_id
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    // ========================================
    // Document I/O
    // ========================================

    /// Read the raw document as stored, without status derivation.
    pub fn load_document(&self) -> RegistryDocument {
        match atomic_read_json::<RegistryDocument>(&self.registry_path) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!(
                    "Registry {} does not exist yet",
                    self.registry_path.display()
                );
                RegistryDocument::empty(self.identity.machine_id.clone())
            }
            Err(e) => {
                warn!(
                    "Registry {} is unreadable, treating as empty: {}",
                    self.registry_path.display(),
                    e
                );
                RegistryDocument::empty(self.identity.machine_id.clone())
            }
        }
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_guard.lock().map_err(|_| RecallError::Other(
            "Failed to acquire registry write lock".to_string(),
        ))
    }

    /// Load, apply `f`, stamp and atomically write back.
    fn update<T>(&self, f: impl FnOnce(&mut RegistryDocument) -> Result<T>) -> Result<T> {
        let _guard = self.lock_writes()?;
        let mut doc = self.load_document();
        let out = f(&mut doc)?;

        doc.schema_version = RegistryConfig::SCHEMA_VERSION;
        doc.machine_id = self.identity.machine_id.clone();
        doc.last_updated = Utc::now();
        atomic_write_json(&self.registry_path, &doc)?;
        Ok(out)
    }

    fn current_entry(&self, now: DateTime<Utc>) -> Result<InstanceEntry> {
        let stats = self.store.stats().unwrap_or_else(|e| {
            warn!("Failed to collect store stats: {}", e);
            Default::default()
        });
        let sharing = SharingSettings::load(&self.store)?;

        Ok(InstanceEntry {
            instance_id: self.identity.instance_id.clone(),
            label: self.identity.label(&self.store)?,
            project_root: self.project_root.clone(),
            store_path: self.store.path().to_path_buf(),
            schema_version: self.store.schema_version()?,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            sharing_mode: sharing.mode,
            sharing_types: sharing.type_names(),
            stats,
            last_heartbeat: now,
            status: InstanceStatus::Active,
            pid: Some(std::process::id()),
            machine_id: self.identity.machine_id.clone(),
            extra: Default::default(),
        })
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Upsert this instance's full entry. Idempotent.
    pub fn register(&self) -> Result<InstanceEntry> {
        self.stopped.store(false, Ordering::SeqCst);
        let mut entry = self.current_entry(Utc::now())?;
        let entry = self.update(|doc| {
            if let Some(existing) = doc.instances.get(&entry.instance_id) {
                entry.extra = existing.extra.clone();
            }
            doc.instances
                .insert(entry.instance_id.clone(), entry.clone());
            Ok(entry)
        })?;

        info!(
            "Registered instance {} ({}) in {}",
            entry.instance_id,
            entry.label,
            self.registry_path.display()
        );
        Ok(entry)
    }

    /// Refresh heartbeat, stats and sharing on this instance's entry,
    /// re-registering if the entry has disappeared.
    pub fn heartbeat(&self) -> Result<InstanceEntry> {
        match self.refresh(false)? {
            Some(entry) => Ok(entry),
            None => self.register(),
        }
    }

    /// Timer tick: like `heartbeat`, but a no-op once `shutdown` has begun so
    /// that a tick already in flight cannot revive a stopped entry.
    fn heartbeat_tick(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.refresh(true)?.is_none() && !self.stopped.load(Ordering::SeqCst) {
            self.register()?;
        }
        Ok(())
    }

    fn refresh(&self, from_timer: bool) -> Result<Option<InstanceEntry>> {
        let fresh = self.current_entry(Utc::now())?;
        let refreshed = self.update(|doc| {
            if from_timer && self.stopped.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let Some(entry) = doc.instances.get_mut(&fresh.instance_id) else {
                info!(
                    "Entry for {} missing from registry, re-registering",
                    fresh.instance_id
                );
                return Ok(None);
            };
            entry.label = fresh.label.clone();
            entry.sharing_mode = fresh.sharing_mode;
            entry.sharing_types = fresh.sharing_types.clone();
            entry.stats = fresh.stats.clone();
            entry.last_heartbeat = fresh.last_heartbeat;
            entry.status = InstanceStatus::Active;
            entry.pid = fresh.pid;
            Ok(Some(entry.clone()))
        })?;

        if let Some(entry) = &refreshed {
            debug!("Heartbeat for {}", entry.instance_id);
        }
        Ok(refreshed)
    }

    /// Stop the heartbeat and mark this instance stopped.
    pub fn shutdown(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_heartbeat();

        let instance_id = self.identity.instance_id.clone();
        let found = self.update(|doc| {
            Ok(match doc.instances.get_mut(&instance_id) {
                Some(entry) => {
                    entry.status = InstanceStatus::Stopped;
                    entry.pid = None;
                    true
                }
                None => false,
            })
        })?;

        if found {
            info!("Marked instance {} stopped", instance_id);
        } else {
            debug!("Instance {} was not registered at shutdown", instance_id);
        }
        Ok(())
    }

    /// Start the periodic heartbeat. Replaces any running heartbeat.
    ///
    /// The task holds only a weak reference, so it ends once the registry is
    /// dropped.
    pub fn start_heartbeat(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        let task = PeriodicTask::spawn("heartbeat", self.settings.heartbeat_interval, move || {
            let Some(registry) = weak.upgrade() else {
                return false;
            };
            if let Err(e) = registry.heartbeat_tick() {
                warn!("Heartbeat failed: {}", e);
            }
            true
        })?;

        if let Ok(mut slot) = self.heartbeat_task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    pub fn stop_heartbeat(&self) {
        if let Ok(mut slot) = self.heartbeat_task.lock() {
            if let Some(mut task) = slot.take() {
                task.stop();
            }
        }
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat_task
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|t| t.is_running()))
            .unwrap_or(false)
    }

    // ========================================
    // Reads
    // ========================================

    /// The whole registry with every entry's status derived as of now.
    pub fn get_registry(&self) -> RegistryDocument {
        let mut doc = self.load_document();
        let now = Utc::now();
        for entry in doc.instances.values_mut() {
            entry.status = derive_status(
                entry,
                now,
                &self.identity.machine_id,
                self.settings.stale_threshold,
            );
        }
        doc
    }

    /// Active instances, plus stale ones when `include_stale` is set.
    pub fn list_instances(&self, include_stale: bool) -> Vec<InstanceEntry> {
        self.get_registry()
            .instances
            .into_values()
            .filter(|entry| match entry.status {
                InstanceStatus::Active => true,
                InstanceStatus::Stale => include_stale,
                InstanceStatus::Stopped => false,
            })
            .collect()
    }

    /// One entry with derived status, whatever that status is.
    pub fn get_instance(&self, instance_id: &str) -> Option<InstanceEntry> {
        self.get_registry().instances.remove(instance_id)
    }

    /// Remove entries whose last heartbeat is older than the prune threshold.
    pub fn prune_stale(&self) -> Result<usize> {
        let threshold = self.settings.prune_threshold;
        let now = Utc::now();
        let removed = self.update(|doc| {
            let before = doc.instances.len();
            doc.instances
                .retain(|_, entry| entry.heartbeat_age(now) <= threshold);
            Ok(before - doc.instances.len())
        })?;

        if removed > 0 {
            info!("Pruned {} stale instance(s) from registry", removed);
        }
        Ok(removed)
    }

    // ========================================
    // Settings
    // ========================================

    /// Persist a new label and publish it.
    pub fn set_label(&self, label: &str) -> Result<InstanceEntry> {
        self.identity.set_label(&self.store, label)?;
        self.heartbeat()
    }

    /// Persist new sharing settings and publish them.
    pub fn set_sharing(
        &self,
        mode: SharingMode,
        types: impl IntoIterator<Item = Category>,
    ) -> Result<InstanceEntry> {
        let sharing = SharingSettings::new(mode, types);
        sharing.save(&self.store)?;
        info!(
            "Sharing set to {} [{}]",
            sharing.mode,
            sharing.type_names().join(", ")
        );
        self.heartbeat()
    }
}

impl Drop for InstanceRegistry {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        registry: InstanceRegistry,
    }

    fn fixture_with(settings: CoordinationSettings) -> Fixture {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("alpha");
        let store = LocalStore::open(project.join(".recall").join("memory.db")).unwrap();
        let identity = LocalIdentity::resolve(&store, &project).unwrap();
        let registry = InstanceRegistry::open_at(
            temp.path().join("registry").join("instances.json"),
            &project,
            store,
            identity,
            settings,
        );
        Fixture {
            _temp: temp,
            registry,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(CoordinationSettings::default())
    }

    fn peer_entry(id: &str, machine_id: &str, pid: Option<u32>, age: chrono::Duration) -> InstanceEntry {
        let mut entry: InstanceEntry =
            serde_json::from_value(serde_json::json!({ "instance_id": id })).unwrap();
        entry.label = id.to_string();
        entry.machine_id = machine_id.to_string();
        entry.pid = pid;
        entry.last_heartbeat = Utc::now() - age;
        entry
    }

    fn insert_raw(registry: &InstanceRegistry, entry: InstanceEntry) {
        let mut doc = registry.load_document();
        doc.instances.insert(entry.instance_id.clone(), entry);
        atomic_write_json(registry.path(), &doc).unwrap();
    }

    #[test]
    fn test_derive_status_rules() {
        let now = Utc::now();
        let stale = Duration::from_secs(300);
        let fresh = peer_entry("a", "m1", Some(10), chrono::Duration::seconds(5));
        let old = peer_entry("a", "m1", Some(10), chrono::Duration::minutes(10));

        assert_eq!(derive_status_with(&fresh, now, "m1", stale, |_| true), InstanceStatus::Active);
        assert_eq!(derive_status_with(&old, now, "m1", stale, |_| true), InstanceStatus::Stale);
        // Dead pid beats heartbeat age.
        assert_eq!(derive_status_with(&fresh, now, "m1", stale, |_| false), InstanceStatus::Stopped);
        // Foreign machines skip the probe.
        assert_eq!(derive_status_with(&fresh, now, "m2", stale, |_| false), InstanceStatus::Active);
        assert_eq!(derive_status_with(&old, now, "m2", stale, |_| false), InstanceStatus::Stale);

        let mut stopped = fresh.clone();
        stopped.status = InstanceStatus::Stopped;
        assert_eq!(derive_status_with(&stopped, now, "m1", stale, |_| true), InstanceStatus::Stopped);

        let no_pid = peer_entry("b", "m1", None, chrono::Duration::seconds(1));
        assert_eq!(derive_status_with(&no_pid, now, "m1", stale, |_| true), InstanceStatus::Stopped);
    }

    #[test]
    fn test_register_is_idempotent() {
        let f = fixture();
        let first = f.registry.register().unwrap();
        f.registry.register().unwrap();

        let doc = f.registry.get_registry();
        assert_eq!(doc.instances.len(), 1);
        let entry = &doc.instances[&first.instance_id];
        assert_eq!(entry.status, InstanceStatus::Active);
        assert_eq!(entry.label, "alpha");
        assert_eq!(entry.pid, Some(std::process::id()));
        assert_eq!(entry.schema_version, crate::config::StoreConfig::SCHEMA_VERSION);
    }

    #[test]
    fn test_heartbeat_reregisters_missing_entry() {
        let f = fixture();
        f.registry.register().unwrap();
        std::fs::remove_file(f.registry.path()).unwrap();

        let entry = f.registry.heartbeat().unwrap();
        assert_eq!(entry.instance_id, f.registry.instance_id());
        assert!(f.registry.get_instance(f.registry.instance_id()).is_some());
    }

    #[test]
    fn test_heartbeat_preserves_unknown_fields() {
        let f = fixture();
        let mut entry = f.registry.register().unwrap();
        entry
            .extra
            .insert("future_field".to_string(), serde_json::json!([1, 2]));
        insert_raw(&f.registry, entry);

        f.registry.heartbeat().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(f.registry.path()).unwrap()).unwrap();
        assert_eq!(
            raw["instances"][f.registry.instance_id()]["future_field"],
            serde_json::json!([1, 2])
        );
    }

    #[test]
    fn test_shutdown_marks_stopped() {
        let f = fixture();
        f.registry.register().unwrap();
        f.registry.shutdown().unwrap();

        assert!(f.registry.list_instances(true).is_empty());
        let entry = f.registry.get_instance(f.registry.instance_id()).unwrap();
        assert_eq!(entry.status, InstanceStatus::Stopped);
        assert_eq!(entry.pid, None);
    }

    #[test]
    fn test_list_filters_by_status() {
        let f = fixture();
        f.registry.register().unwrap();
        let machine = f.registry.identity().machine_id.clone();
        let me = std::process::id();

        insert_raw(&f.registry, peer_entry("stale-peer", &machine, Some(me), chrono::Duration::minutes(10)));
        insert_raw(&f.registry, peer_entry("dead-peer", &machine, Some(999_999_999), chrono::Duration::seconds(1)));

        let active: Vec<_> = f.registry.list_instances(false).into_iter().map(|e| e.instance_id).collect();
        assert_eq!(active, vec![f.registry.instance_id().to_string()]);

        let with_stale = f.registry.list_instances(true);
        assert_eq!(with_stale.len(), 2);
        assert!(with_stale.iter().any(|e| e.instance_id == "stale-peer"));

        let doc = f.registry.get_registry();
        assert_eq!(doc.instances["dead-peer"].status, InstanceStatus::Stopped);
    }

    #[test]
    fn test_corrupt_registry_degrades_to_empty() {
        let f = fixture();
        std::fs::create_dir_all(f.registry.path().parent().unwrap()).unwrap();
        std::fs::write(f.registry.path(), "{ not json").unwrap();

        assert!(f.registry.list_instances(true).is_empty());
        assert!(f.registry.get_registry().instances.is_empty());

        f.registry.register().unwrap();
        assert_eq!(f.registry.list_instances(false).len(), 1);
    }

    #[test]
    fn test_prune_removes_old_entries() {
        let f = fixture();
        f.registry.register().unwrap();
        insert_raw(&f.registry, peer_entry("ancient", "elsewhere", Some(1), chrono::Duration::hours(25)));
        insert_raw(&f.registry, peer_entry("recent", "elsewhere", Some(1), chrono::Duration::hours(1)));

        assert_eq!(f.registry.prune_stale().unwrap(), 1);
        let doc = f.registry.load_document();
        assert!(!doc.instances.contains_key("ancient"));
        assert!(doc.instances.contains_key("recent"));
        assert_eq!(f.registry.prune_stale().unwrap(), 0);
    }

    #[test]
    fn test_set_sharing_and_label_publish() {
        let f = fixture();
        f.registry.register().unwrap();

        f.registry
            .set_sharing(SharingMode::Read, [Category::Decisions])
            .unwrap();
        f.registry.set_label("alpha-api").unwrap();

        let entry = f.registry.get_instance(f.registry.instance_id()).unwrap();
        assert_eq!(entry.sharing_mode, SharingMode::Read);
        assert_eq!(entry.sharing_types, vec!["decisions".to_string()]);
        assert_eq!(entry.label, "alpha-api");
    }

    #[tokio::test]
    async fn test_heartbeat_timer_refreshes_entry() {
        let settings = CoordinationSettings {
            heartbeat_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let f = fixture_with(settings);
        let registry = Arc::new(f.registry);
        let first = registry.register().unwrap();

        registry.start_heartbeat().unwrap();
        assert!(registry.is_heartbeat_running());
        tokio::time::sleep(Duration::from_millis(150)).await;

        let entry = registry.get_instance(registry.instance_id()).unwrap();
        assert!(entry.last_heartbeat > first.last_heartbeat);

        registry.shutdown().unwrap();
        assert!(!registry.is_heartbeat_running());
    }
}
