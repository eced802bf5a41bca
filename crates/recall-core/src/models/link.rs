//! Entry↔tag and entry↔source link models.
//!
//! Link rows are hard-deleted; they carry no soft-delete marker.

use serde::{Deserialize, Serialize};

use super::SyncStatus;
use crate::util::{local_record_id, now_ms};

/// Link between an entry and a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryTag {
    pub id: String,
    pub user_id: String,
    pub entry_id: String,
    pub tag_id: String,
    pub created_at: i64,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<i64>,
}

impl EntryTag {
    #[must_use]
    pub fn new(user_id: impl Into<String>, entry_id: impl Into<String>, tag_id: impl Into<String>) -> Self {
        Self {
            id: local_record_id(),
            user_id: user_id.into(),
            entry_id: entry_id.into(),
            tag_id: tag_id.into(),
            created_at: now_ms(),
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        }
    }
}

/// Link between an entry and a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySource {
    pub id: String,
    pub user_id: String,
    pub entry_id: String,
    pub source_id: String,
    pub created_at: i64,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<i64>,
}

impl EntrySource {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        entry_id: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: local_record_id(),
            user_id: user_id.into(),
            entry_id: entry_id.into(),
            source_id: source_id.into(),
            created_at: now_ms(),
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        }
    }
}
