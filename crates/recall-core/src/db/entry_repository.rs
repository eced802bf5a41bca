//! Entry repository implementation

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{Entry, EntryPatch, SyncStatus};
use crate::util::now_ms;

use super::{opt_i64, parse_sync_status};

/// Filters applied to entry listing.
///
/// The local store supports combinations (tag + search + starred) that the
/// remote list API does not.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub tag_id: Option<String>,
    pub search: Option<String>,
    pub starred: Option<bool>,
    /// When set, return only soft-deleted rows instead of excluding them
    pub deleted_only: bool,
}

/// One page of entries plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct EntryPage {
    pub entries: Vec<Entry>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Encode the pagination cursor for the last returned row.
fn encode_cursor(entry: &Entry) -> String {
    format!("{}:{}", entry.updated_at, entry.id)
}

fn decode_cursor(raw: &str) -> Result<(i64, String)> {
    let (updated_at, id) = raw
        .split_once(':')
        .ok_or_else(|| Error::InvalidInput(format!("malformed cursor: {raw}")))?;
    let updated_at = updated_at
        .parse::<i64>()
        .map_err(|_| Error::InvalidInput(format!("malformed cursor: {raw}")))?;
    Ok((updated_at, id.to_string()))
}

const ENTRY_COLUMNS: &str = "id, user_id, title, content, starred, version, \
     created_at, updated_at, deleted_at, sync_status, last_synced_at";

/// libSQL implementation of entry storage
pub struct LibSqlEntryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<Entry> {
        Ok(Entry {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            starred: row.get::<i32>(4)? != 0,
            version: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            deleted_at: opt_i64(row, 8)?,
            sync_status: parse_sync_status(&row.get::<String>(9)?)?,
            last_synced_at: opt_i64(row, 10)?,
        })
    }

    /// Insert a freshly created entry
    pub async fn insert(&self, entry: &Entry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO entries (id, user_id, title, content, starred, version,
                     created_at, updated_at, deleted_at, sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    entry.id.as_str(),
                    entry.user_id.as_str(),
                    entry.title.as_str(),
                    entry.content.as_str(),
                    i32::from(entry.starred),
                    entry.version,
                    entry.created_at,
                    entry.updated_at,
                    entry.deleted_at,
                    entry.sync_status.as_str(),
                    entry.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }

    /// Get an entry by ID.
    ///
    /// Soft-deleted rows are returned too; reconciliation needs them.
    pub async fn get(&self, id: &str) -> Result<Option<Entry>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"),
                libsql::params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// List entries for a user, newest-updated first, cursor-paginated.
    ///
    /// Fetches `limit + 1` rows to determine `has_more` without a count query.
    pub async fn list(
        &self,
        user_id: &str,
        filter: &EntryFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<EntryPage> {
        let mut sql = format!(
            "SELECT {} FROM entries e",
            ENTRY_COLUMNS
                .split(", ")
                .map(|c| format!("e.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut params: Vec<libsql::Value> = Vec::new();

        if filter.tag_id.is_some() {
            sql.push_str(" JOIN entry_tags et ON et.entry_id = e.id");
        }

        sql.push_str(" WHERE e.user_id = ?");
        params.push(user_id.into());

        if filter.deleted_only {
            sql.push_str(" AND e.deleted_at IS NOT NULL");
        } else {
            sql.push_str(" AND e.deleted_at IS NULL");
        }

        if let Some(tag_id) = &filter.tag_id {
            sql.push_str(" AND et.tag_id = ?");
            params.push(tag_id.as_str().into());
        }

        if let Some(search) = &filter.search {
            sql.push_str(" AND (e.title LIKE ? OR e.content LIKE ?)");
            let pattern = format!("%{search}%");
            params.push(pattern.clone().into());
            params.push(pattern.into());
        }

        if let Some(starred) = filter.starred {
            sql.push_str(" AND e.starred = ?");
            params.push(i64::from(starred).into());
        }

        if let Some(raw) = cursor {
            let (updated_at, id) = decode_cursor(raw)?;
            sql.push_str(" AND (e.updated_at < ? OR (e.updated_at = ? AND e.id < ?))");
            params.push(updated_at.into());
            params.push(updated_at.into());
            params.push(id.into());
        }

        sql.push_str(" ORDER BY e.updated_at DESC, e.id DESC LIMIT ?");
        #[allow(clippy::cast_possible_wrap)]
        params.push(((limit + 1) as i64).into());

        let mut rows = self
            .conn
            .query(&sql, libsql::params_from_iter(params))
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }

        let has_more = entries.len() > limit;
        entries.truncate(limit);
        let next_cursor = if has_more {
            entries.last().map(encode_cursor)
        } else {
            None
        };

        Ok(EntryPage {
            entries,
            next_cursor,
            has_more,
        })
    }

    /// Apply a partial update to an entry.
    ///
    /// Bumps `updated_at`, marks the row pending, and increments the
    /// optimistic-concurrency version unless the caller supplies an explicit
    /// expected version. Returns `None` when the entry is absent or deleted.
    pub async fn update(&self, id: &str, patch: &EntryPatch) -> Result<Option<Entry>> {
        let Some(current) = self.get(id).await? else {
            return Ok(None);
        };
        if current.is_deleted() {
            return Ok(None);
        }

        let mut updated = current;
        if let Some(title) = &patch.title {
            updated.title = title.clone();
        }
        if let Some(content) = &patch.content {
            updated.content = content.clone();
        }
        if let Some(starred) = patch.starred {
            updated.starred = starred;
        }
        updated.version = patch.expected_version.unwrap_or(updated.version + 1);
        updated.updated_at = now_ms();
        updated.sync_status = SyncStatus::Pending;

        self.conn
            .execute(
                "UPDATE entries SET title = ?, content = ?, starred = ?, version = ?,
                     updated_at = ?, sync_status = ? WHERE id = ?",
                libsql::params![
                    updated.title.as_str(),
                    updated.content.as_str(),
                    i32::from(updated.starred),
                    updated.version,
                    updated.updated_at,
                    updated.sync_status.as_str(),
                    id,
                ],
            )
            .await?;

        Ok(Some(updated))
    }

    /// Soft delete an entry.
    ///
    /// Returns `false` when the entry is absent or already deleted.
    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let now = now_ms();
        let rows = self
            .conn
            .execute(
                "UPDATE entries SET deleted_at = ?, updated_at = ?, sync_status = 'pending'
                 WHERE id = ? AND deleted_at IS NULL",
                libsql::params![now, now, id],
            )
            .await?;
        Ok(rows > 0)
    }

    /// Mark an entry as confirmed by the server.
    ///
    /// When the server assigned a different canonical ID (entry creation
    /// only), the row is re-keyed and the new ID is cascaded into link and
    /// review tables so no reference dangles.
    pub async fn mark_synced(&self, id: &str, server_id: Option<&str>) -> Result<bool> {
        let now = now_ms();

        match server_id {
            Some(new_id) if new_id != id => {
                let rows = self
                    .conn
                    .execute(
                        "UPDATE entries SET id = ?, sync_status = 'synced', last_synced_at = ?
                         WHERE id = ?",
                        libsql::params![new_id, now, id],
                    )
                    .await?;
                if rows == 0 {
                    return Ok(false);
                }

                for table in ["entry_tags", "entry_sources", "review_states", "review_events"] {
                    self.conn
                        .execute(
                            &format!("UPDATE {table} SET entry_id = ? WHERE entry_id = ?"),
                            libsql::params![new_id, id],
                        )
                        .await?;
                }
                tracing::debug!("Re-keyed entry {id} to server ID {new_id}");
                Ok(true)
            }
            _ => {
                let rows = self
                    .conn
                    .execute(
                        "UPDATE entries SET sync_status = 'synced', last_synced_at = ? WHERE id = ?",
                        libsql::params![now, id],
                    )
                    .await?;
                Ok(rows > 0)
            }
        }
    }

    /// Mark an entry as diverged, awaiting conflict resolution.
    pub async fn mark_conflict(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE entries SET sync_status = 'conflict' WHERE id = ?",
                libsql::params![id],
            )
            .await?;
        Ok(rows > 0)
    }

    /// All entries with unconfirmed local mutations, oldest first.
    pub async fn pending(&self, user_id: &str) -> Result<Vec<Entry>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE user_id = ? AND sync_status = 'pending'
                     ORDER BY updated_at ASC"
                ),
                libsql::params![user_id],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    /// Overwrite (or insert) a row with the server's version, marked synced.
    pub async fn apply_remote(&self, entry: &Entry) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO entries (id, user_id, title, content, starred, version,
                     created_at, updated_at, deleted_at, sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'synced', ?)",
                libsql::params![
                    entry.id.as_str(),
                    entry.user_id.as_str(),
                    entry.title.as_str(),
                    entry.content.as_str(),
                    i32::from(entry.starred),
                    entry.version,
                    entry.created_at,
                    entry.updated_at,
                    entry.deleted_at,
                    now_ms(),
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_get() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = Entry::new("user-1", "Borrow checker", "References cannot outlive owners");
        repo.insert(&entry).await.unwrap();

        let fetched = repo.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(fetched, entry);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_bumps_version_and_marks_pending() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let mut entry = Entry::new("user-1", "Title", "Body");
        entry.sync_status = SyncStatus::Synced;
        repo.insert(&entry).await.unwrap();

        let patch = EntryPatch {
            content: Some("New body".to_string()),
            ..EntryPatch::default()
        };
        let updated = repo.update(&entry.id, &patch).await.unwrap().unwrap();

        assert_eq!(updated.content, "New body");
        assert_eq!(updated.version, entry.version + 1);
        assert_eq!(updated.sync_status, SyncStatus::Pending);
        assert!(updated.updated_at >= entry.updated_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_respects_expected_version() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = Entry::new("user-1", "Title", "Body");
        repo.insert(&entry).await.unwrap();

        let patch = EntryPatch {
            title: Some("Renamed".to_string()),
            expected_version: Some(7),
            ..EntryPatch::default()
        };
        let updated = repo.update(&entry.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.version, 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_returns_none() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let result = repo.update("nope", &EntryPatch::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_soft_delete_excludes_from_list_but_not_get() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = Entry::new("user-1", "Gone", "Soon");
        repo.insert(&entry).await.unwrap();

        assert!(repo.soft_delete(&entry.id).await.unwrap());
        // Second delete is a no-op
        assert!(!repo.soft_delete(&entry.id).await.unwrap());

        let page = repo
            .list("user-1", &EntryFilter::default(), None, 10)
            .await
            .unwrap();
        assert!(page.entries.is_empty());

        // Still findable by ID for reconciliation
        let fetched = repo.get(&entry.id).await.unwrap().unwrap();
        assert!(fetched.deleted_at.is_some());
        assert_eq!(fetched.sync_status, SyncStatus::Pending);

        let deleted_page = repo
            .list(
                "user-1",
                &EntryFilter {
                    deleted_only: true,
                    ..EntryFilter::default()
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(deleted_page.entries.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_paginates_with_cursor() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        for i in 0..5 {
            let mut entry = Entry::new("user-1", format!("Entry {i}"), "body");
            // Distinct updated_at values so ordering is deterministic
            entry.updated_at = 1_000 + i;
            repo.insert(&entry).await.unwrap();
        }

        let first = repo
            .list("user-1", &EntryFilter::default(), None, 2)
            .await
            .unwrap();
        assert_eq!(first.entries.len(), 2);
        assert!(first.has_more);
        assert_eq!(first.entries[0].title, "Entry 4");

        let second = repo
            .list(
                "user-1",
                &EntryFilter::default(),
                first.next_cursor.as_deref(),
                2,
            )
            .await
            .unwrap();
        assert_eq!(second.entries.len(), 2);
        assert_eq!(second.entries[0].title, "Entry 2");
        assert!(second.has_more);

        let third = repo
            .list(
                "user-1",
                &EntryFilter::default(),
                second.next_cursor.as_deref(),
                2,
            )
            .await
            .unwrap();
        assert_eq!(third.entries.len(), 1);
        assert!(!third.has_more);
        assert!(third.next_cursor.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_filters_by_search_and_starred() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let mut starred = Entry::new("user-1", "Ownership", "moves and borrows");
        starred.starred = true;
        repo.insert(&starred).await.unwrap();
        repo.insert(&Entry::new("user-1", "Lifetimes", "borrow scopes"))
            .await
            .unwrap();
        repo.insert(&Entry::new("user-2", "Ownership", "other user"))
            .await
            .unwrap();

        let found = repo
            .list(
                "user-1",
                &EntryFilter {
                    search: Some("borrow".to_string()),
                    ..EntryFilter::default()
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(found.entries.len(), 2);

        let starred_only = repo
            .list(
                "user-1",
                &EntryFilter {
                    starred: Some(true),
                    ..EntryFilter::default()
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(starred_only.entries.len(), 1);
        assert_eq!(starred_only.entries[0].title, "Ownership");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_rekeys_and_cascades() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = Entry::new("user-1", "Title", "Body");
        repo.insert(&entry).await.unwrap();
        db.connection()
            .execute(
                "INSERT INTO entry_tags (id, user_id, entry_id, tag_id, created_at, sync_status)
                 VALUES ('l1', 'user-1', ?, 't1', 0, 'pending')",
                libsql::params![entry.id.as_str()],
            )
            .await
            .unwrap();

        assert!(repo
            .mark_synced(&entry.id, Some("srv-123"))
            .await
            .unwrap());

        assert!(repo.get(&entry.id).await.unwrap().is_none());
        let rekeyed = repo.get("srv-123").await.unwrap().unwrap();
        assert_eq!(rekeyed.sync_status, SyncStatus::Synced);
        assert!(rekeyed.last_synced_at.is_some());

        let mut rows = db
            .connection()
            .query(
                "SELECT entry_id FROM entry_tags WHERE id = 'l1'",
                (),
            )
            .await
            .unwrap();
        let linked: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(linked, "srv-123");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_returns_only_unconfirmed() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let pending = Entry::new("user-1", "Pending", "body");
        repo.insert(&pending).await.unwrap();

        let mut synced = Entry::new("user-1", "Synced", "body");
        synced.sync_status = SyncStatus::Synced;
        repo.insert(&synced).await.unwrap();

        let result = repo.pending("user-1").await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].title, "Pending");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_remote_overwrites_and_marks_synced() {
        let db = setup().await;
        let repo = LibSqlEntryRepository::new(db.connection());

        let entry = Entry::new("user-1", "Local title", "body");
        repo.insert(&entry).await.unwrap();

        let mut remote = entry.clone();
        remote.title = "Remote title".to_string();
        remote.version = 4;
        repo.apply_remote(&remote).await.unwrap();

        let fetched = repo.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Remote title");
        assert_eq!(fetched.version, 4);
        assert_eq!(fetched.sync_status, SyncStatus::Synced);
    }
}
