//! Cross-instance query service.
//!
//! Discovers peers through the registry, checks each owner's published
//! sharing policy, and reads their stores through cached read-only handles.
//! Peer stores are never written from here.

mod handles;
mod permissions;
mod scoped;
mod service;
mod types;

pub use handles::{PeerHandle, PeerHandleCache};
pub use permissions::{check_import_permission, check_permission};
pub use service::CrossInstanceQuery;
pub use types::{
    ImportPayload, InstanceStatsView, QueryOptions, QueryResult, SearchAllOptions, SourceInstance,
};
