//! Recall Core - cross-instance coordination for file-backed agent memory stores.
//!
//! Each project runs its own instance with its own SQLite store. This crate
//! lets those instances find each other through a shared registry file, read
//! each other's sessions, decisions and tasks within the limits each owner
//! publishes, and keep specific records private unless the owner approves a
//! request for them. There is no server: everything goes through the local
//! filesystem.
//!
//! # Example
//!
//! ```rust,ignore
//! use recall_core::{Category, Coordinator, QueryOptions, SharingMode};
//!
//! #[tokio::main]
//! async fn main() -> recall_core::Result<()> {
//!     let coordinator = Coordinator::builder("/path/to/project").build()?;
//!     coordinator.start()?;
//!
//!     coordinator
//!         .registry()
//!         .set_sharing(SharingMode::Read, [Category::Decisions])?;
//!
//!     for peer in coordinator.query().discover_instances(false) {
//!         let result = coordinator
//!             .query()
//!             .query_decisions(&peer.instance_id, &QueryOptions::search("retry"))?;
//!         println!("{}: {} decision(s)", peer.label, result.rows.len());
//!     }
//!
//!     coordinator.shutdown()
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod platform;
pub mod query;
pub mod registry;
pub mod sensitive;
pub mod store;

mod coordinator;
mod timer;

// Re-export commonly used types
pub use config::CoordinationSettings;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{DenialReason, RecallError, Result};
pub use models::{
    AccessRequestStatus, Category, InstanceEntry, InstanceStats, InstanceStatus,
    RegistryDocument, SensitiveAccessRequest, SharingMode,
};
pub use query::{
    CrossInstanceQuery, ImportPayload, InstanceStatsView, QueryOptions, QueryResult,
    SearchAllOptions, SourceInstance,
};
pub use registry::{InstanceRegistry, LocalIdentity};
pub use sensitive::{SensitiveDataService, SensitiveSummary, SensitivityPolicy};
pub use store::{ConfigStore, LocalStore, SharingSettings};
pub use timer::PeriodicTask;
