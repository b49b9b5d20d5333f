//! Shared instance registry for discovery across processes.
//!
//! Each running instance publishes one entry in a JSON document under the
//! per-user config directory and keeps it fresh with a periodic heartbeat.
//! Peers read the same document to discover each other.
//!
//! # Location
//!
//! - **Linux**: `~/.config/recall/instances.json`
//! - **Windows**: `%APPDATA%\recall\instances.json`
//! - **macOS**: `~/Library/Application Support/recall/instances.json`

mod identity;
mod instances;

pub use identity::LocalIdentity;
pub use instances::{derive_status, InstanceRegistry};
