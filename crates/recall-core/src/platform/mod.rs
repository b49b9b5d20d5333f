//! Platform abstraction layer for cross-platform compatibility.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module rather
//! than scattered throughout the codebase.
//!
//! - `paths` - Per-user config locations and machine identity
//! - `process` - Process liveness probing

pub mod paths;
pub mod process;

// Re-export commonly used items
pub use paths::{default_store_path, machine_id, recall_config_dir, registry_path};
pub use process::is_process_alive;
