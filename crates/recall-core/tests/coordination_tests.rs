//! End-to-end tests for discovery, permissioned queries and sensitive locks
//! across several instances sharing one registry file.

use recall_core::store::atomic_write_json;
use recall_core::{
    Category, CoordinationSettings, Coordinator, DenialReason, InstanceStatus, QueryOptions,
    RecallError, SearchAllOptions, SharingMode,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

struct Cluster {
    root: TempDir,
    registry_path: PathBuf,
}

impl Cluster {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let registry_path = root.path().join("config").join("instances.json");
        Self {
            root,
            registry_path,
        }
    }

    fn instance(&self, name: &str) -> Coordinator {
        self.instance_with(name, CoordinationSettings::default())
    }

    fn instance_with(&self, name: &str, settings: CoordinationSettings) -> Coordinator {
        let project = self.root.path().join(name);
        std::fs::create_dir_all(&project).unwrap();
        let coordinator = Coordinator::builder(&project)
            .registry_path(&self.registry_path)
            .settings(settings)
            .build()
            .unwrap();
        coordinator.registry().register().unwrap();
        coordinator
    }
}

fn share(instance: &Coordinator, mode: SharingMode, types: &[Category]) {
    instance
        .registry()
        .set_sharing(mode, types.iter().copied())
        .unwrap();
}

fn insert_decision(instance: &Coordinator, id: i64, title: &str, decision: &str) {
    instance
        .store()
        .with_connection(|conn| {
            conn.execute(
                "INSERT INTO decisions (id, title, decision, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, title, decision, format!("2026-03-{:02}T00:00:00Z", id % 28 + 1)],
            )?;
            Ok(())
        })
        .unwrap();
}

fn insert_task(instance: &Coordinator, title: &str) {
    instance
        .store()
        .with_connection(|conn| {
            conn.execute(
                "INSERT INTO tasks (title, created_at, updated_at) VALUES (?1, ?2, ?2)",
                rusqlite::params![title, "2026-03-01T00:00:00Z"],
            )?;
            Ok(())
        })
        .unwrap();
}

fn row_ids(rows: &[serde_json::Map<String, serde_json::Value>]) -> Vec<i64> {
    rows.iter().filter_map(|r| r["id"].as_i64()).collect()
}

fn denial(err: RecallError) -> DenialReason {
    match err {
        RecallError::PermissionDenied { reason, .. } => reason,
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
}

#[test]
fn test_register_round_trips_through_registry() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");

    let registered = a.registry().register().unwrap();
    let mut listed = a.registry().get_registry().instances[a.instance_id()].clone();
    listed.status = registered.status;

    assert_eq!(listed, registered);
    assert_eq!(listed.store_path, a.store().path());
}

#[test]
fn test_read_sharing_scenario() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");

    insert_decision(&a, 1, "Storage", "Use SQLite in WAL mode");
    insert_decision(&a, 2, "Retries", "Exponential backoff");
    insert_task(&a, "Write the migration");
    share(&a, SharingMode::Read, &[Category::Decisions]);

    let result = b
        .query()
        .query_decisions(a.instance_id(), &QueryOptions::default())
        .unwrap();
    assert_eq!(result.source.instance_id, a.instance_id());
    assert_eq!(result.source.label, "alpha");
    assert_eq!(result.category, Category::Decisions);
    assert_eq!(row_ids(&result.rows), vec![2, 1]);

    let err = b
        .query()
        .query_tasks(a.instance_id(), &QueryOptions::default())
        .unwrap_err();
    assert!(matches!(
        denial(err),
        DenialReason::CategoryNotShared { ref category, .. } if category == "tasks"
    ));
}

#[test]
fn test_disabled_sharing_is_distinct_from_unshared_category() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");
    share(&a, SharingMode::Read, &[Category::Decisions]);

    let not_shared = b
        .query()
        .query_tasks(a.instance_id(), &QueryOptions::default())
        .unwrap_err()
        .to_string();

    share(&a, SharingMode::None, &[Category::Decisions, Category::Tasks]);
    let disabled_err = b
        .query()
        .query_tasks(a.instance_id(), &QueryOptions::default())
        .unwrap_err();
    let disabled = disabled_err.to_string();
    assert_eq!(denial(disabled_err), DenialReason::SharingDisabled);

    assert_ne!(not_shared, disabled);
}

#[test]
fn test_unknown_instance_and_category() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");
    share(&a, SharingMode::Read, &[Category::Decisions]);

    let err = b
        .query()
        .query("no-such-instance", "decisions", &QueryOptions::default())
        .unwrap_err();
    assert!(matches!(err, RecallError::InstanceNotFound { .. }));

    let err = b
        .query()
        .query(a.instance_id(), "embeddings", &QueryOptions::default())
        .unwrap_err();
    assert!(matches!(err, RecallError::InvalidCategory(_)));
}

#[test]
fn test_locked_record_is_never_returned() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");
    share(&a, SharingMode::Read, &[Category::Decisions]);

    insert_decision(&a, 41, "Cache policy", "Cache tokens for an hour");
    insert_decision(&a, 42, "Token storage", "Store tokens in the keychain");
    insert_decision(&a, 43, "Token refresh", "Refresh tokens eagerly");
    a.sensitive()
        .lock_records(Category::Decisions, &["42"])
        .unwrap();

    let search = b
        .query()
        .query_decisions(a.instance_id(), &QueryOptions::search("tokens"))
        .unwrap();
    let mut ids = row_ids(&search.rows);
    ids.sort();
    assert_eq!(ids, vec![41, 43]);

    // A full page is still returned after filtering.
    let page = b
        .query()
        .query_decisions(a.instance_id(), &QueryOptions::default().with_limit(2))
        .unwrap();
    assert_eq!(row_ids(&page.rows), vec![43, 41]);

    // Unlocking restores visibility.
    a.sensitive()
        .unlock_records(Category::Decisions, &["42"])
        .unwrap();
    let search = b
        .query()
        .query_decisions(a.instance_id(), &QueryOptions::search("keychain"))
        .unwrap();
    assert_eq!(row_ids(&search.rows), vec![42]);
}

#[test]
fn test_approved_request_reveals_locked_record_to_requester_only() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");
    let c = cluster.instance("gamma");
    share(&a, SharingMode::Read, &[Category::Decisions]);

    insert_decision(&a, 42, "Token storage", "Store tokens in the keychain");
    a.sensitive()
        .lock_records(Category::Decisions, &["42"])
        .unwrap();

    let request = a
        .sensitive()
        .create_access_request(b.instance_id(), "beta", Category::Decisions, &["42"], Some("audit"))
        .unwrap();
    let approved = a.sensitive().approve_request(&request.id, "alpha-owner").unwrap();
    let again = a.sensitive().approve_request(&request.id, "alpha-owner").unwrap();
    assert_eq!(again.resolved_at, approved.resolved_at);
    assert_eq!(again, approved);

    let for_b = b
        .query()
        .query_decisions(a.instance_id(), &QueryOptions::search("keychain"))
        .unwrap();
    assert_eq!(row_ids(&for_b.rows), vec![42]);

    let for_c = c
        .query()
        .query_decisions(a.instance_id(), &QueryOptions::search("keychain"))
        .unwrap();
    assert!(for_c.rows.is_empty());

    // Approval does not remove the lock.
    assert!(a.sensitive().is_locked(Category::Decisions, "42").unwrap());
}

#[test]
fn test_search_all_fans_out_and_isolates_failures() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");
    let c = cluster.instance("gamma");

    insert_decision(&a, 1, "Queue", "Use a bounded channel");
    insert_decision(&b, 1, "Queue", "Use a bounded channel too");
    insert_decision(&c, 1, "Queue", "Unbounded channel");
    share(&a, SharingMode::Read, &[Category::Decisions]);
    share(&b, SharingMode::Read, &[Category::Decisions]);
    share(&c, SharingMode::None, &[Category::Decisions]);

    // A peer whose store has vanished.
    let broken = cluster.instance("delta");
    share(&broken, SharingMode::Read, &[Category::Decisions]);
    let broken_store = broken.store().path().to_path_buf();
    drop(broken);
    std::fs::remove_file(&broken_store).unwrap();

    let results = b
        .query()
        .search_all("channel", &SearchAllOptions::new(Category::Decisions));

    let sources: Vec<&str> = results
        .iter()
        .map(|r| r.source.instance_id.as_str())
        .collect();
    assert_eq!(sources, vec![a.instance_id()]);
    assert_eq!(row_ids(&results[0].rows), vec![1]);

    // Scope outside every peer's sharing yields nothing.
    let none = b
        .query()
        .search_all("channel", &SearchAllOptions::new(Category::Tasks));
    assert!(none.is_empty());
}

#[test]
fn test_direct_query_reports_unavailable_peer() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    share(&a, SharingMode::Read, &[Category::Decisions]);
    let a_id = a.instance_id().to_string();
    let a_store = a.store().path().to_path_buf();
    drop(a);
    std::fs::remove_file(&a_store).unwrap();

    let b = cluster.instance("beta");
    let err = b
        .query()
        .query_decisions(&a_id, &QueryOptions::default())
        .unwrap_err();
    assert!(matches!(err, RecallError::UnavailablePeer { .. }));
    assert!(err.is_retryable());
}

#[test]
fn test_extract_for_import_requires_full_sharing() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");
    insert_decision(&a, 1, "One", "first");
    insert_decision(&a, 2, "Two", "second");
    insert_decision(&a, 3, "Three", "third");

    share(&a, SharingMode::Read, &[Category::Decisions]);
    let err = b
        .query()
        .extract_for_import(a.instance_id(), "decisions", None)
        .unwrap_err();
    assert_eq!(
        denial(err),
        DenialReason::ImportRequiresFull {
            mode: "read".to_string()
        }
    );

    share(&a, SharingMode::Full, &[Category::Decisions]);
    a.sensitive()
        .lock_records(Category::Decisions, &["2"])
        .unwrap();

    let all = b
        .query()
        .extract_for_import(a.instance_id(), "decisions", None)
        .unwrap();
    assert_eq!(row_ids(&all.records), vec![3, 1]);
    assert_eq!(all.withheld, 1);

    let wanted = vec!["1".to_string(), "2".to_string()];
    let some = b
        .query()
        .extract_for_import(a.instance_id(), "decisions", Some(&wanted))
        .unwrap();
    assert_eq!(row_ids(&some.records), vec![1]);
    assert_eq!(some.withheld, 1);
    assert_eq!(some.records[0]["decision"], serde_json::json!("first"));
}

#[test]
fn test_instance_stats_never_open_the_store() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");
    insert_task(&a, "one");
    insert_task(&a, "two");
    a.registry().heartbeat().unwrap();

    std::fs::remove_file(a.store().path()).unwrap();

    let stats = b.query().get_instance_stats(a.instance_id()).unwrap();
    assert_eq!(stats.label, "alpha");
    assert_eq!(stats.stats.count(Category::Tasks), 2);
    assert_eq!(stats.sharing_mode, SharingMode::None);
    assert!(b.query().handles().is_empty());
}

#[test]
fn test_older_peer_schema_degrades() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");
    let b = cluster.instance("beta");
    share(&a, SharingMode::Read, &[Category::Tasks]);
    a.store()
        .with_connection(|conn| {
            conn.execute_batch("DROP TABLE tasks_fts; DROP TABLE tasks;")?;
            Ok(())
        })
        .unwrap();

    let result = b
        .query()
        .query_tasks(a.instance_id(), &QueryOptions::search("anything"))
        .unwrap();
    assert!(result.rows.is_empty());
}

#[test]
fn test_handle_cache_capacity_evicts_oldest() {
    let cluster = Cluster::new();
    let settings = CoordinationSettings {
        max_handles: 2,
        ..Default::default()
    };
    let x = cluster.instance("x");
    let y = cluster.instance("y");
    let z = cluster.instance("z");
    for peer in [&x, &y, &z] {
        share(peer, SharingMode::Read, &[Category::Decisions]);
    }
    let reader = cluster.instance_with("reader", settings);

    for peer in [&x, &y, &z] {
        reader
            .query()
            .query_decisions(peer.instance_id(), &QueryOptions::default())
            .unwrap();
    }

    let handles = reader.query().handles();
    assert_eq!(handles.len(), 2);
    assert!(!handles.contains(x.store().path()));
    assert!(handles.contains(y.store().path()));
    assert!(handles.contains(z.store().path()));

    assert_eq!(reader.query().close_all(), 2);
}

#[test]
fn test_prune_twice_prunes_nothing_the_second_time() {
    let cluster = Cluster::new();
    let a = cluster.instance("alpha");

    let mut doc = a.registry().load_document();
    let mut ancient = doc.instances[a.instance_id()].clone();
    ancient.instance_id = "ancient".to_string();
    ancient.last_heartbeat = chrono::Utc::now() - chrono::Duration::days(3);
    doc.instances.insert("ancient".to_string(), ancient);
    atomic_write_json(a.registry().path(), &doc).unwrap();

    assert_eq!(a.registry().prune_stale().unwrap(), 1);
    assert_eq!(a.registry().prune_stale().unwrap(), 0);
    assert!(a.registry().get_instance(a.instance_id()).is_some());
}

fn project_dir(root: &Path, name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_builder_rejects_missing_project_root() {
    let temp = TempDir::new().unwrap();
    let result = Coordinator::builder(temp.path().join("missing"))
        .registry_path(temp.path().join("instances.json"))
        .build();
    assert!(matches!(result, Err(RecallError::Config { .. })));
}

#[test]
fn test_builder_label_and_identity_persist() {
    let temp = TempDir::new().unwrap();
    let project = project_dir(temp.path(), "service");
    let registry = temp.path().join("instances.json");

    let first_id = {
        let c = Coordinator::builder(&project)
            .registry_path(&registry)
            .label("billing")
            .build()
            .unwrap();
        assert_eq!(c.label().unwrap(), "billing");
        c.instance_id().to_string()
    };

    let c = Coordinator::builder(&project)
        .registry_path(&registry)
        .build()
        .unwrap();
    assert_eq!(c.instance_id(), first_id);
    assert_eq!(c.label().unwrap(), "billing");
}

#[tokio::test]
async fn test_start_and_shutdown_lifecycle() {
    let temp = TempDir::new().unwrap();
    let project = project_dir(temp.path(), "alpha");
    let registry = temp.path().join("instances.json");
    let settings = CoordinationSettings {
        heartbeat_interval: Duration::from_millis(20),
        sweep_interval: Duration::from_millis(20),
        ..Default::default()
    };

    let coordinator = Coordinator::builder(&project)
        .registry_path(&registry)
        .settings(settings.clone())
        .build()
        .unwrap();
    let started = coordinator.start().unwrap();
    assert!(coordinator.is_started());
    assert!(coordinator.registry().is_heartbeat_running());

    tokio::time::sleep(Duration::from_millis(120)).await;
    let entry = coordinator
        .registry()
        .get_instance(coordinator.instance_id())
        .unwrap();
    assert_eq!(entry.status, InstanceStatus::Active);
    assert!(entry.last_heartbeat > started.last_heartbeat);

    coordinator.shutdown().unwrap();
    assert!(!coordinator.is_started());
    tokio::time::sleep(Duration::from_millis(60)).await;
    let entry = coordinator
        .registry()
        .get_instance(coordinator.instance_id())
        .unwrap();
    assert_eq!(entry.status, InstanceStatus::Stopped);
    assert_eq!(entry.pid, None);
    assert!(coordinator.registry().list_instances(true).is_empty());

    // Dropping a started coordinator marks it stopped as well.
    let other_project = project_dir(temp.path(), "beta");
    let other = Coordinator::builder(&other_project)
        .registry_path(&registry)
        .settings(settings)
        .build()
        .unwrap();
    let other_id = other.instance_id().to_string();
    other.start().unwrap();
    drop(other);

    let doc: recall_core::RegistryDocument =
        serde_json::from_str(&std::fs::read_to_string(&registry).unwrap()).unwrap();
    assert_eq!(doc.instances[&other_id].status, InstanceStatus::Stopped);
}
