//! Offline-first sync engine.
//!
//! Local mutations commit durably first and queue into the
//! [`PendingOperationLog`]; the [`SyncService`] drains the queue against
//! the remote API, pulls remote deltas back into the local store, and
//! records unresolved divergences in the [`ConflictStore`].

mod conflicts;
mod pending;
mod publisher;
mod service;

pub use conflicts::ConflictStore;
pub use pending::PendingOperationLog;
pub use publisher::{SubscriberId, SyncStatePublisher};
pub use service::{ProgressFn, SyncOptions, SyncService};
