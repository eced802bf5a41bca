//! Tag model

use serde::{Deserialize, Serialize};

use super::SyncStatus;
use crate::util::{local_record_id, now_ms};

/// A tag for organizing entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub user_id: String,
    /// Tag name (stored in lowercase)
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<i64>,
}

impl Tag {
    /// Create a new tag with the given name.
    ///
    /// The name is automatically converted to lowercase.
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: local_record_id(),
            user_id: user_id.into(),
            name: name.into().trim().to_lowercase(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tag_lowercases_name() {
        let tag = Tag::new("user-1", "  Rust ");
        assert_eq!(tag.name, "rust");
        assert_eq!(tag.sync_status, SyncStatus::Pending);
    }
}
