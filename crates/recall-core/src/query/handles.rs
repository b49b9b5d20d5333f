//! Bounded cache of read-only connections to peer stores.
//!
//! Handles are keyed by store path and expire after a fixed TTL so that a
//! long-running process does not accumulate descriptors across many peers.
//! At capacity, the handle closest to expiry (the oldest) is evicted first.

use crate::{RecallError, Result};
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Shared read-only connection to one peer store.
pub type PeerHandle = Arc<Mutex<Connection>>;

struct CachedHandle {
    handle: PeerHandle,
    expires_at: Instant,
    /// Open order, breaks ties between equal expiry instants.
    seq: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<PathBuf, CachedHandle>,
    next_seq: u64,
}

pub struct PeerHandleCache {
    max_handles: usize,
    ttl: Duration,
    busy_timeout: Duration,
    state: Mutex<CacheState>,
}

impl PeerHandleCache {
    pub fn new(max_handles: usize, ttl: Duration, busy_timeout: Duration) -> Self {
        Self {
            max_handles: max_handles.max(1),
            ttl,
            busy_timeout,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state.lock().map_err(|_| RecallError::Other(
            "Failed to acquire peer handle cache lock".to_string(),
        ))
    }

    /// Return a live handle for `store_path`, opening one if needed.
    pub fn get_or_open(&self, store_path: &Path) -> Result<PeerHandle> {
        let mut state = self.lock_state()?;
        let now = Instant::now();

        if let Some(cached) = state.entries.get(store_path) {
            if cached.expires_at > now {
                return Ok(cached.handle.clone());
            }
            debug!("Peer handle for {} expired", store_path.display());
            state.entries.remove(store_path);
        }

        while state.entries.len() >= self.max_handles {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, cached)| (cached.expires_at, cached.seq))
                .map(|(path, _)| path.clone());
            match oldest {
                Some(path) => {
                    debug!("Evicting peer handle for {}", path.display());
                    state.entries.remove(&path);
                }
                None => break,
            }
        }

        let handle = Arc::new(Mutex::new(self.open(store_path)?));
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            store_path.to_path_buf(),
            CachedHandle {
                handle: handle.clone(),
                expires_at: now + self.ttl,
                seq,
            },
        );
        debug!("Opened peer handle for {}", store_path.display());
        Ok(handle)
    }

    fn open(&self, store_path: &Path) -> Result<Connection> {
        // A read-only open of a missing file only reports SQLITE_CANTOPEN.
        if !store_path.is_file() {
            return Err(RecallError::Io {
                message: format!("Store file does not exist: {}", store_path.display()),
                path: Some(store_path.to_path_buf()),
                source: None,
            });
        }

        let conn = Connection::open_with_flags(
            store_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Drop the handle for `store_path`, if cached.
    pub fn evict(&self, store_path: &Path) -> bool {
        self.lock_state()
            .map(|mut state| state.entries.remove(store_path).is_some())
            .unwrap_or(false)
    }

    /// Drop every expired handle; returns how many were closed.
    pub fn sweep_expired(&self) -> usize {
        let Ok(mut state) = self.lock_state() else {
            return 0;
        };
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, cached| cached.expires_at > now);
        let closed = before - state.entries.len();
        if closed > 0 {
            debug!("Swept {} expired peer handle(s)", closed);
        }
        closed
    }

    /// Drop every handle; returns how many were closed.
    pub fn close_all(&self) -> usize {
        let Ok(mut state) = self.lock_state() else {
            return 0;
        };
        let closed = state.entries.len();
        state.entries.clear();
        closed
    }

    pub fn len(&self) -> usize {
        self.lock_state().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, store_path: &Path) -> bool {
        self.lock_state()
            .map(|s| s.entries.contains_key(store_path))
            .unwrap_or(false)
    }
}
