//! Entry model

use serde::{Deserialize, Serialize};

use super::SyncStatus;
use crate::util::{local_record_id, now_ms};

/// A captured note/learning entry.
///
/// Entries carry a `version` counter used for optimistic-concurrency checks
/// against the server; tags and sources rely on timestamp comparison only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Record identifier (`local-` prefixed until confirmed by the server)
    pub id: String,
    /// Owning user, always supplied by the caller
    pub user_id: String,
    pub title: String,
    pub content: String,
    /// Starred entries surface in the starred review queue
    pub starred: bool,
    /// Optimistic-concurrency counter, incremented on every local update
    pub version: i64,
    /// Creation timestamp (Unix ms), immutable
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft-delete marker; rows are never hard-deleted
    pub deleted_at: Option<i64>,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<i64>,
}

impl Entry {
    /// Create a new locally owned entry, pending upload.
    #[must_use]
    pub fn new(user_id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: local_record_id(),
            user_id: user_id.into(),
            title: title.into(),
            content: content.into(),
            starred: false,
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
        }
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// First line of the content, truncated to `max_len` characters.
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        let line = if self.title.trim().is_empty() {
            self.content.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        line.chars().take(max_len).collect()
    }
}

/// Partial update applied to an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub starred: Option<bool>,
    /// When set, the update keeps this version instead of incrementing
    pub expected_version: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::is_local_record_id;

    #[test]
    fn new_entry_is_pending_with_local_id() {
        let entry = Entry::new("user-1", "Rust ownership", "Moves transfer ownership");
        assert!(is_local_record_id(&entry.id));
        assert_eq!(entry.sync_status, SyncStatus::Pending);
        assert_eq!(entry.version, 1);
        assert_eq!(entry.created_at, entry.updated_at);
        assert!(!entry.is_deleted());
    }

    #[test]
    fn preview_prefers_title_and_truncates() {
        let entry = Entry::new("user-1", "A long title for preview", "body");
        assert_eq!(entry.preview(6), "A long");

        let untitled = Entry::new("user-1", "  ", "first line\nsecond line");
        assert_eq!(untitled.preview(40), "first line");
    }
}
