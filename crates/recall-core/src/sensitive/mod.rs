//! Sensitive-record locks and the human-approved access-request workflow.
//!
//! Locks and requests live in the owner's store. The owner manages them
//! through `SensitiveDataService`; a requester reading a peer evaluates them
//! through `SensitivityPolicy` on its read-only handle. Approving a request
//! never removes the lock itself.

mod locks;
mod requests;
mod service;

pub use locks::LockSet;
pub use service::{SensitiveDataService, SensitiveSummary, SensitivityPolicy};
