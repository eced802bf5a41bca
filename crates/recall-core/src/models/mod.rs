//! Data models for Recall

mod entry;
mod link;
mod review;
mod source;
mod sync;
mod tag;

pub use entry::{Entry, EntryPatch};
pub use link::{EntrySource, EntryTag};
pub use review::{ReviewEvent, ReviewRating, ReviewState};
pub use source::{Source, SourcePatch};
pub use sync::{
    ConflictStrategy, EntityKind, OperationKind, PendingOperation, SyncConflict, SyncErrorDetail,
    SyncMetadata, SyncOutcome, SyncPhase, SyncResult, SyncState, SyncStatus,
};
pub use tag::Tag;
