//! Centralized configuration for Recall.
//!
//! Compile-time defaults live on unit structs as associated constants.
//! `CoordinationSettings` carries the subset that can be overridden at
//! runtime (tests shorten the timers, hosts may resize the handle cache).

use std::time::Duration;

/// Shared registry file configuration.
pub struct RegistryConfig;

impl RegistryConfig {
    pub const APP_CONFIG_DIR_NAME: &'static str = "recall";
    pub const REGISTRY_FILENAME: &'static str = "instances.json";
    /// Version of the registry document layout.
    pub const SCHEMA_VERSION: u32 = 1;
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
    /// Heartbeat age after which an entry is reported as stale.
    pub const STALE_THRESHOLD: Duration = Duration::from_secs(5 * 60);
    /// Heartbeat age after which an entry is deleted by `prune_stale`.
    pub const PRUNE_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);
}

/// Read-only peer handle cache configuration.
pub struct PeerCacheConfig;

impl PeerCacheConfig {
    pub const MAX_HANDLES: usize = 8;
    pub const HANDLE_TTL: Duration = Duration::from_secs(60);
    /// Bounded wait against transient write locks held by the peer.
    pub const BUSY_TIMEOUT: Duration = Duration::from_millis(2000);
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
}

/// Cross-instance query configuration.
pub struct QueryConfig;

impl QueryConfig {
    pub const DEFAULT_LIMIT: usize = 20;
    pub const MAX_LIMIT: usize = 200;
    /// Upper bound on rows returned by an import extraction without explicit ids.
    pub const MAX_EXTRACT_ROWS: usize = 1000;
}

/// Local store configuration.
pub struct StoreConfig;

impl StoreConfig {
    /// Schema version written to `PRAGMA user_version` of stores created here.
    pub const SCHEMA_VERSION: u32 = 3;
    pub const BUSY_TIMEOUT_MS: u32 = 5000;
    pub const DEFAULT_STORE_DIR: &'static str = ".recall";
    pub const DEFAULT_STORE_FILENAME: &'static str = "memory.db";
}

/// Keys used in the local config table.
pub struct ConfigKeys;

impl ConfigKeys {
    pub const INSTANCE_ID: &'static str = "instance_id";
    pub const INSTANCE_LABEL: &'static str = "instance_label";
    pub const SHARING_MODE: &'static str = "sharing_mode";
    pub const SHARING_TYPES: &'static str = "sharing_types";
    pub const SENSITIVE_LOCKS: &'static str = "sensitive_locks";
}

/// Runtime-tunable coordination settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationSettings {
    pub heartbeat_interval: Duration,
    pub stale_threshold: Duration,
    pub prune_threshold: Duration,
    pub max_handles: usize,
    pub handle_ttl: Duration,
    pub busy_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: RegistryConfig::HEARTBEAT_INTERVAL,
            stale_threshold: RegistryConfig::STALE_THRESHOLD,
            prune_threshold: RegistryConfig::PRUNE_THRESHOLD,
            max_handles: PeerCacheConfig::MAX_HANDLES,
            handle_ttl: PeerCacheConfig::HANDLE_TTL,
            busy_timeout: PeerCacheConfig::BUSY_TIMEOUT,
            sweep_interval: PeerCacheConfig::SWEEP_INTERVAL,
        }
    }
}
