//! Local persistence: the instance's SQLite store, its config surface and the
//! atomic JSON writer used for the shared registry file.

mod atomic;
mod local;
pub mod rows;
mod settings;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use local::LocalStore;
pub use settings::{ConfigStore, SharingSettings};
