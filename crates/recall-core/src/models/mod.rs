//! Data models shared by the registry, the query service and the sensitive
//! data service.
//!
//! Field names map directly to the registry JSON document and to the columns
//! of the local store, so peers running other versions can read them.

mod access;
mod category;
mod instance;

pub use access::*;
pub use category::*;
pub use instance::*;
