//! The per-process entry point tying the coordination services together.

mod builder;

pub use builder::CoordinatorBuilder;

use crate::models::InstanceEntry;
use crate::query::CrossInstanceQuery;
use crate::registry::InstanceRegistry;
use crate::sensitive::SensitiveDataService;
use crate::store::LocalStore;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// One instance's registry presence, query service and sensitive-data service.
///
/// Create one per process with [`Coordinator::builder`] and pass it by
/// reference. `start` publishes the instance and starts the heartbeat and
/// handle sweeper; `shutdown` (or dropping a started coordinator) stops them
/// and marks the instance stopped.
pub struct Coordinator {
    pub(crate) project_root: PathBuf,
    pub(crate) store: LocalStore,
    pub(crate) registry: Arc<InstanceRegistry>,
    pub(crate) sensitive: Arc<SensitiveDataService>,
    pub(crate) query: Arc<CrossInstanceQuery>,
    pub(crate) started: AtomicBool,
}

impl Coordinator {
    pub fn builder(project_root: impl Into<PathBuf>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(project_root)
    }

    /// Register this instance and start background timers.
    ///
    /// Requires a tokio runtime.
    pub fn start(&self) -> Result<InstanceEntry> {
        let entry = self.registry.register()?;
        self.registry.start_heartbeat()?;
        if let Err(e) = self.query.start_sweeper() {
            self.registry.stop_heartbeat();
            return Err(e);
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(entry)
    }

    /// Stop timers, close peer handles and mark this instance stopped.
    pub fn shutdown(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        self.query.stop_sweeper();
        self.query.close_all();
        self.registry.shutdown()?;
        info!("Coordinator for {} shut down", self.project_root.display());
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn instance_id(&self) -> &str {
        self.registry.instance_id()
    }

    /// Current label, as configured or derived from the project directory.
    pub fn label(&self) -> Result<String> {
        self.registry.identity().label(&self.store)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    pub fn sensitive(&self) -> &Arc<SensitiveDataService> {
        &self.sensitive
    }

    pub fn query(&self) -> &Arc<CrossInstanceQuery> {
        &self.query
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.is_started() {
            if let Err(e) = self.shutdown() {
                warn!("Shutdown on drop failed: {}", e);
            }
        }
    }
}
