//! Sync bookkeeping models: statuses, pending operations, conflicts, results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::util::now_ms;

/// Per-record sync marker carried by every mutable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Confirmed by the server
    Synced,
    /// Local mutation not yet confirmed
    Pending,
    /// Divergence detected, awaiting resolution
    Conflict,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Closed set of synced entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Entry,
    Tag,
    Source,
    EntryTag,
    EntrySource,
    ReviewState,
    ReviewEvent,
}

impl EntityKind {
    /// All families, in the order the download phase walks them.
    pub const ALL: [Self; 7] = [
        Self::Entry,
        Self::Tag,
        Self::Source,
        Self::EntryTag,
        Self::EntrySource,
        Self::ReviewState,
        Self::ReviewEvent,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Tag => "tag",
            Self::Source => "source",
            Self::EntryTag => "entry_tag",
            Self::EntrySource => "entry_source",
            Self::ReviewState => "review_state",
            Self::ReviewEvent => "review_event",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation kind recorded in the pending-operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A not-yet-confirmed mutation queued for upload.
///
/// At most one operation exists per `(entity, entity_id)`; newer mutations
/// coalesce into the existing one instead of appending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,
    pub entity: EntityKind,
    pub entity_id: String,
    pub kind: OperationKind,
    /// Latest full snapshot of the record at enqueue time
    pub payload: Value,
    pub created_at: i64,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl PendingOperation {
    #[must_use]
    pub fn new(entity: EntityKind, entity_id: impl Into<String>, kind: OperationKind, payload: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            entity,
            entity_id: entity_id.into(),
            kind,
            payload,
            created_at: now_ms(),
            retry_count: 0,
            last_error: None,
        }
    }
}

/// How a detected divergence is (or was) settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Force-push the local version, overwriting remote
    Local,
    /// Overwrite local with the remote version
    Remote,
    /// Record the divergence and wait for an explicit resolution
    Manual,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        Self::Manual
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown conflict strategy: {other}")),
        }
    }
}

/// A recorded divergence between the local and remote version of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: String,
    pub entity: EntityKind,
    pub entity_id: String,
    pub local_snapshot: Value,
    /// `Value::Null` when the remote side was unknown at detection time
    pub remote_snapshot: Value,
    pub local_updated_at: i64,
    pub remote_updated_at: i64,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
    pub resolution: Option<ConflictStrategy>,
}

impl SyncConflict {
    #[must_use]
    pub fn new(
        entity: EntityKind,
        entity_id: impl Into<String>,
        local_snapshot: Value,
        remote_snapshot: Value,
        local_updated_at: i64,
        remote_updated_at: i64,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            entity,
            entity_id: entity_id.into(),
            local_snapshot,
            remote_snapshot,
            local_updated_at,
            remote_updated_at,
            created_at: now_ms(),
            resolved_at: None,
            resolution: None,
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Outcome of the most recent sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Success,
    Partial,
    Failed,
}

/// Cached sync timestamps plus counts re-derived from the stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub last_sync_at: Option<i64>,
    pub last_outcome: Option<SyncOutcome>,
    pub pending_operations: usize,
    pub unresolved_conflicts: usize,
}

/// Coarse lifecycle state published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
    Error,
    Conflict,
}

/// Phase markers reported through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Preparing,
    Uploading,
    Downloading,
    Resolving,
    Complete,
}

/// One failed operation or download item from a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorDetail {
    pub entity: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub message: String,
}

impl SyncErrorDetail {
    #[must_use]
    pub fn for_record(entity: EntityKind, entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: Some(entity),
            entity_id: Some(entity_id.into()),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            entity: None,
            entity_id: None,
            message: message.into(),
        }
    }
}

/// Aggregate result of one sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub uploaded: usize,
    pub downloaded: usize,
    pub conflicts: usize,
    pub errors: Vec<SyncErrorDetail>,
    pub duration_ms: i64,
    pub success: bool,
}

impl SyncResult {
    /// Result for a sync call rejected before any work happened.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            uploaded: 0,
            downloaded: 0,
            conflicts: 0,
            errors: vec![SyncErrorDetail::general(message)],
            duration_ms: 0,
            success: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_roundtrips_through_strings() {
        for status in [SyncStatus::Synced, SyncStatus::Pending, SyncStatus::Conflict] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn entity_kind_all_covers_every_family() {
        assert_eq!(EntityKind::ALL.len(), 7);
        assert_eq!(EntityKind::Entry.as_str(), "entry");
        assert_eq!(EntityKind::ReviewEvent.to_string(), "review_event");
    }

    #[test]
    fn new_conflict_starts_unresolved() {
        let conflict = SyncConflict::new(
            EntityKind::Entry,
            "e1",
            serde_json::json!({"title": "local"}),
            serde_json::json!({"title": "remote"}),
            100,
            200,
        );
        assert!(!conflict.is_resolved());
        assert!(conflict.resolution.is_none());
    }

    #[test]
    fn rejected_result_reports_failure_without_counts() {
        let result = SyncResult::rejected("already in progress");
        assert!(!result.success);
        assert_eq!(result.uploaded, 0);
        assert_eq!(result.errors.len(), 1);
    }
}
