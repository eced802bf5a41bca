//! Source model (books, articles, links an entry was captured from)

use serde::{Deserialize, Serialize};

use super::SyncStatus;
use crate::util::{local_record_id, now_ms};

/// A reference source that entries can link to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub url: Option<String>,
    /// Free-form kind, e.g. "book", "article", "video"
    pub kind: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<i64>,
}

impl Source {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        url: Option<String>,
        kind: Option<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: local_record_id(),
            user_id: user_id.into(),
            title: title.into(),
            url: crate::util::normalize_text_option(url),
            kind: crate::util::normalize_text_option(kind),
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
}

/// Partial update applied to a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePatch {
    pub title: Option<String>,
    pub url: Option<Option<String>>,
    pub kind: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_source_normalizes_optional_fields() {
        let source = Source::new("user-1", "The Rust Book", Some("  ".to_string()), None);
        assert_eq!(source.url, None);
        assert_eq!(source.kind, None);
        assert_eq!(source.sync_status, SyncStatus::Pending);
    }
}
