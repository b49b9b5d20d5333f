//! Builder for configuring Coordinator initialization.

use super::Coordinator;
use crate::config::CoordinationSettings;
use crate::error::{RecallError, Result};
use crate::platform;
use crate::query::CrossInstanceQuery;
use crate::registry::{InstanceRegistry, LocalIdentity};
use crate::sensitive::SensitiveDataService;
use crate::store::LocalStore;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

/// Builder for configuring Coordinator initialization.
///
/// # Example
///
/// ```rust,ignore
/// use recall_core::Coordinator;
///
/// let coordinator = Coordinator::builder("./my-project")
///     .registry_path("/tmp/instances.json")
///     .label("api")
///     .build()?;
/// coordinator.start()?;
/// ```
pub struct CoordinatorBuilder {
    project_root: PathBuf,
    store_path: Option<PathBuf>,
    registry_path: Option<PathBuf>,
    settings: CoordinationSettings,
    label: Option<String>,
}

impl CoordinatorBuilder {
    /// Create a new builder for the project at `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            store_path: None,
            registry_path: None,
            settings: CoordinationSettings::default(),
            label: None,
        }
    }

    /// Use a store file other than `<project>/.recall/memory.db`.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Use a registry file other than the per-user default.
    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    /// Override timers and cache limits.
    ///
    /// Default: `CoordinationSettings::default()`
    pub fn settings(mut self, settings: CoordinationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Persist `label` as this instance's label during `build`.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Open the store, resolve identity and wire up the services.
    pub fn build(self) -> Result<Coordinator> {
        if !self.project_root.is_dir() {
            return Err(RecallError::Config {
                message: format!(
                    "Project root does not exist: {}",
                    self.project_root.display()
                ),
            });
        }

        let store_path = self
            .store_path
            .unwrap_or_else(|| platform::default_store_path(&self.project_root));
        let store = LocalStore::open(&store_path)?;

        let identity = LocalIdentity::resolve(&store, &self.project_root)?;
        if let Some(label) = &self.label {
            identity.set_label(&store, label)?;
        }

        let registry = match self.registry_path {
            Some(path) => InstanceRegistry::open_at(
                path,
                &self.project_root,
                store.clone(),
                identity.clone(),
                self.settings.clone(),
            ),
            None => InstanceRegistry::open(
                &self.project_root,
                store.clone(),
                identity.clone(),
                self.settings.clone(),
            )?,
        };
        let registry = Arc::new(registry);

        let sensitive = Arc::new(SensitiveDataService::new(store.clone()));
        let query = Arc::new(CrossInstanceQuery::new(
            registry.clone(),
            self.settings.clone(),
        ));

        info!(
            "Coordinator ready for {} (instance {}, store {})",
            self.project_root.display(),
            identity.instance_id,
            store_path.display()
        );

        Ok(Coordinator {
            project_root: self.project_root,
            store,
            registry,
            sensitive,
            query,
            started: AtomicBool::new(false),
        })
    }
}
