//! Tag, source, and link repositories.
//!
//! Tags and sources follow the same soft-delete discipline as entries but
//! carry no version counter; the sync engine compares timestamps only.
//! Link rows (entry↔tag, entry↔source) are hard-deleted.

use libsql::Connection;

use crate::error::Result;
use crate::models::{EntrySource, EntryTag, Source, SourcePatch, SyncStatus, Tag};
use crate::util::now_ms;

use super::{opt_i64, opt_text, parse_sync_status};

/// libSQL implementation of tag storage
pub struct LibSqlTagRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTagRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_tag(row: &libsql::Row) -> Result<Tag> {
        Ok(Tag {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: opt_i64(row, 5)?,
            sync_status: parse_sync_status(&row.get::<String>(6)?)?,
            last_synced_at: opt_i64(row, 7)?,
        })
    }

    pub async fn insert(&self, tag: &Tag) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tags (id, user_id, name, created_at, updated_at, deleted_at,
                     sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    tag.id.as_str(),
                    tag.user_id.as_str(),
                    tag.name.as_str(),
                    tag.created_at,
                    tag.updated_at,
                    tag.deleted_at,
                    tag.sync_status.as_str(),
                    tag.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Tag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, name, created_at, updated_at, deleted_at,
                        sync_status, last_synced_at
                 FROM tags WHERE id = ?",
                libsql::params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_tag(&row)?)),
            None => Ok(None),
        }
    }

    /// Find a non-deleted tag by name (names are unique per user).
    pub async fn find_by_name(&self, user_id: &str, name: &str) -> Result<Option<Tag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, name, created_at, updated_at, deleted_at,
                        sync_status, last_synced_at
                 FROM tags
                 WHERE user_id = ? AND name = ? COLLATE NOCASE AND deleted_at IS NULL",
                libsql::params![user_id, name],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_tag(&row)?)),
            None => Ok(None),
        }
    }

    /// List non-deleted tags alphabetically.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Tag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, name, created_at, updated_at, deleted_at,
                        sync_status, last_synced_at
                 FROM tags WHERE user_id = ? AND deleted_at IS NULL
                 ORDER BY name ASC",
                libsql::params![user_id],
            )
            .await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            tags.push(Self::parse_tag(&row)?);
        }
        Ok(tags)
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<Option<Tag>> {
        let rows = self
            .conn
            .execute(
                "UPDATE tags SET name = ?, updated_at = ?, sync_status = 'pending'
                 WHERE id = ? AND deleted_at IS NULL",
                libsql::params![name.trim().to_lowercase(), now_ms(), id],
            )
            .await?;
        if rows == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let now = now_ms();
        let rows = self
            .conn
            .execute(
                "UPDATE tags SET deleted_at = ?, updated_at = ?, sync_status = 'pending'
                 WHERE id = ? AND deleted_at IS NULL",
                libsql::params![now, now, id],
            )
            .await?;
        Ok(rows > 0)
    }

    pub async fn mark_synced(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE tags SET sync_status = 'synced', last_synced_at = ? WHERE id = ?",
                libsql::params![now_ms(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    pub async fn pending(&self, user_id: &str) -> Result<Vec<Tag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, name, created_at, updated_at, deleted_at,
                        sync_status, last_synced_at
                 FROM tags WHERE user_id = ? AND sync_status = 'pending'
                 ORDER BY updated_at ASC",
                libsql::params![user_id],
            )
            .await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            tags.push(Self::parse_tag(&row)?);
        }
        Ok(tags)
    }

    pub async fn apply_remote(&self, tag: &Tag) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO tags (id, user_id, name, created_at, updated_at,
                     deleted_at, sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, 'synced', ?)",
                libsql::params![
                    tag.id.as_str(),
                    tag.user_id.as_str(),
                    tag.name.as_str(),
                    tag.created_at,
                    tag.updated_at,
                    tag.deleted_at,
                    now_ms(),
                ],
            )
            .await?;
        Ok(())
    }
}

/// libSQL implementation of source storage
pub struct LibSqlSourceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSourceRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_source(row: &libsql::Row) -> Result<Source> {
        Ok(Source {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            url: opt_text(row, 3)?,
            kind: opt_text(row, 4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            deleted_at: opt_i64(row, 7)?,
            sync_status: parse_sync_status(&row.get::<String>(8)?)?,
            last_synced_at: opt_i64(row, 9)?,
        })
    }

    pub async fn insert(&self, source: &Source) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sources (id, user_id, title, url, kind, created_at, updated_at,
                     deleted_at, sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    source.id.as_str(),
                    source.user_id.as_str(),
                    source.title.as_str(),
                    source.url.clone(),
                    source.kind.clone(),
                    source.created_at,
                    source.updated_at,
                    source.deleted_at,
                    source.sync_status.as_str(),
                    source.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Source>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, title, url, kind, created_at, updated_at, deleted_at,
                        sync_status, last_synced_at
                 FROM sources WHERE id = ?",
                libsql::params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_source(&row)?)),
            None => Ok(None),
        }
    }

    /// List non-deleted sources, most recently updated first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Source>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, title, url, kind, created_at, updated_at, deleted_at,
                        sync_status, last_synced_at
                 FROM sources WHERE user_id = ? AND deleted_at IS NULL
                 ORDER BY updated_at DESC",
                libsql::params![user_id],
            )
            .await?;

        let mut sources = Vec::new();
        while let Some(row) = rows.next().await? {
            sources.push(Self::parse_source(&row)?);
        }
        Ok(sources)
    }

    pub async fn update(&self, id: &str, patch: &SourcePatch) -> Result<Option<Source>> {
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
        if let Some(url) = &patch.url {
            updated.url = url.clone();
        }
        if let Some(kind) = &patch.kind {
            updated.kind = kind.clone();
        }
        updated.updated_at = now_ms();
        updated.sync_status = SyncStatus::Pending;

        self.conn
            .execute(
                "UPDATE sources SET title = ?, url = ?, kind = ?, updated_at = ?,
                     sync_status = ? WHERE id = ?",
                libsql::params![
                    updated.title.as_str(),
                    updated.url.clone(),
                    updated.kind.clone(),
                    updated.updated_at,
                    updated.sync_status.as_str(),
                    id,
                ],
            )
            .await?;

        Ok(Some(updated))
    }

    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let now = now_ms();
        let rows = self
            .conn
            .execute(
                "UPDATE sources SET deleted_at = ?, updated_at = ?, sync_status = 'pending'
                 WHERE id = ? AND deleted_at IS NULL",
                libsql::params![now, now, id],
            )
            .await?;
        Ok(rows > 0)
    }

    pub async fn mark_synced(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sources SET sync_status = 'synced', last_synced_at = ? WHERE id = ?",
                libsql::params![now_ms(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    pub async fn pending(&self, user_id: &str) -> Result<Vec<Source>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, title, url, kind, created_at, updated_at, deleted_at,
                        sync_status, last_synced_at
                 FROM sources WHERE user_id = ? AND sync_status = 'pending'
                 ORDER BY updated_at ASC",
                libsql::params![user_id],
            )
            .await?;

        let mut sources = Vec::new();
        while let Some(row) = rows.next().await? {
            sources.push(Self::parse_source(&row)?);
        }
        Ok(sources)
    }

    pub async fn apply_remote(&self, source: &Source) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sources (id, user_id, title, url, kind, created_at,
                     updated_at, deleted_at, sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'synced', ?)",
                libsql::params![
                    source.id.as_str(),
                    source.user_id.as_str(),
                    source.title.as_str(),
                    source.url.clone(),
                    source.kind.clone(),
                    source.created_at,
                    source.updated_at,
                    source.deleted_at,
                    now_ms(),
                ],
            )
            .await?;
        Ok(())
    }
}

/// libSQL implementation of entry↔tag / entry↔source link storage
pub struct LibSqlLinkRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlLinkRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry_tag(row: &libsql::Row) -> Result<EntryTag> {
        Ok(EntryTag {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entry_id: row.get(2)?,
            tag_id: row.get(3)?,
            created_at: row.get(4)?,
            sync_status: parse_sync_status(&row.get::<String>(5)?)?,
            last_synced_at: opt_i64(row, 6)?,
        })
    }

    fn parse_entry_source(row: &libsql::Row) -> Result<EntrySource> {
        Ok(EntrySource {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entry_id: row.get(2)?,
            source_id: row.get(3)?,
            created_at: row.get(4)?,
            sync_status: parse_sync_status(&row.get::<String>(5)?)?,
            last_synced_at: opt_i64(row, 6)?,
        })
    }

    pub async fn insert_entry_tag(&self, link: &EntryTag) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO entry_tags (id, user_id, entry_id, tag_id, created_at,
                     sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    link.id.as_str(),
                    link.user_id.as_str(),
                    link.entry_id.as_str(),
                    link.tag_id.as_str(),
                    link.created_at,
                    link.sync_status.as_str(),
                    link.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get_entry_tag(&self, id: &str) -> Result<Option<EntryTag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, entry_id, tag_id, created_at, sync_status, last_synced_at
                 FROM entry_tags WHERE id = ?",
                libsql::params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry_tag(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_entry_tag(&self, entry_id: &str, tag_id: &str) -> Result<Option<EntryTag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, entry_id, tag_id, created_at, sync_status, last_synced_at
                 FROM entry_tags WHERE entry_id = ? AND tag_id = ?",
                libsql::params![entry_id, tag_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry_tag(&row)?)),
            None => Ok(None),
        }
    }

    /// Hard-delete a link row by ID.
    pub async fn delete_entry_tag(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM entry_tags WHERE id = ?", libsql::params![id])
            .await?;
        Ok(rows > 0)
    }

    pub async fn tags_for_entry(&self, entry_id: &str) -> Result<Vec<Tag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.id, t.user_id, t.name, t.created_at, t.updated_at, t.deleted_at,
                        t.sync_status, t.last_synced_at
                 FROM tags t
                 JOIN entry_tags et ON et.tag_id = t.id
                 WHERE et.entry_id = ? AND t.deleted_at IS NULL
                 ORDER BY t.name ASC",
                libsql::params![entry_id],
            )
            .await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            tags.push(LibSqlTagRepository::parse_tag(&row)?);
        }
        Ok(tags)
    }

    pub async fn pending_entry_tags(&self, user_id: &str) -> Result<Vec<EntryTag>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, entry_id, tag_id, created_at, sync_status, last_synced_at
                 FROM entry_tags WHERE user_id = ? AND sync_status = 'pending'
                 ORDER BY created_at ASC",
                libsql::params![user_id],
            )
            .await?;

        let mut links = Vec::new();
        while let Some(row) = rows.next().await? {
            links.push(Self::parse_entry_tag(&row)?);
        }
        Ok(links)
    }

    pub async fn mark_entry_tag_synced(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE entry_tags SET sync_status = 'synced', last_synced_at = ? WHERE id = ?",
                libsql::params![now_ms(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    pub async fn apply_remote_entry_tag(&self, link: &EntryTag) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO entry_tags (id, user_id, entry_id, tag_id, created_at,
                     sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, 'synced', ?)",
                libsql::params![
                    link.id.as_str(),
                    link.user_id.as_str(),
                    link.entry_id.as_str(),
                    link.tag_id.as_str(),
                    link.created_at,
                    now_ms(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn insert_entry_source(&self, link: &EntrySource) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO entry_sources (id, user_id, entry_id, source_id,
                     created_at, sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                libsql::params![
                    link.id.as_str(),
                    link.user_id.as_str(),
                    link.entry_id.as_str(),
                    link.source_id.as_str(),
                    link.created_at,
                    link.sync_status.as_str(),
                    link.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get_entry_source(&self, id: &str) -> Result<Option<EntrySource>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, entry_id, source_id, created_at, sync_status, last_synced_at
                 FROM entry_sources WHERE id = ?",
                libsql::params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry_source(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_entry_source(
        &self,
        entry_id: &str,
        source_id: &str,
    ) -> Result<Option<EntrySource>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, entry_id, source_id, created_at, sync_status, last_synced_at
                 FROM entry_sources WHERE entry_id = ? AND source_id = ?",
                libsql::params![entry_id, source_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_entry_source(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_entry_source(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM entry_sources WHERE id = ?",
                libsql::params![id],
            )
            .await?;
        Ok(rows > 0)
    }

    pub async fn sources_for_entry(&self, entry_id: &str) -> Result<Vec<Source>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.user_id, s.title, s.url, s.kind, s.created_at, s.updated_at,
                        s.deleted_at, s.sync_status, s.last_synced_at
                 FROM sources s
                 JOIN entry_sources es ON es.source_id = s.id
                 WHERE es.entry_id = ? AND s.deleted_at IS NULL
                 ORDER BY s.title ASC",
                libsql::params![entry_id],
            )
            .await?;

        let mut sources = Vec::new();
        while let Some(row) = rows.next().await? {
            sources.push(LibSqlSourceRepository::parse_source(&row)?);
        }
        Ok(sources)
    }

    pub async fn pending_entry_sources(&self, user_id: &str) -> Result<Vec<EntrySource>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, entry_id, source_id, created_at, sync_status, last_synced_at
                 FROM entry_sources WHERE user_id = ? AND sync_status = 'pending'
                 ORDER BY created_at ASC",
                libsql::params![user_id],
            )
            .await?;

        let mut links = Vec::new();
        while let Some(row) = rows.next().await? {
            links.push(Self::parse_entry_source(&row)?);
        }
        Ok(links)
    }

    pub async fn mark_entry_source_synced(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE entry_sources SET sync_status = 'synced', last_synced_at = ? WHERE id = ?",
                libsql::params![now_ms(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    pub async fn apply_remote_entry_source(&self, link: &EntrySource) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO entry_sources (id, user_id, entry_id, source_id,
                     created_at, sync_status, last_synced_at)
                 VALUES (?, ?, ?, ?, ?, 'synced', ?)",
                libsql::params![
                    link.id.as_str(),
                    link.user_id.as_str(),
                    link.entry_id.as_str(),
                    link.source_id.as_str(),
                    link.created_at,
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
    use crate::models::Entry;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tag_insert_find_and_rename() {
        let db = setup().await;
        let repo = LibSqlTagRepository::new(db.connection());

        let tag = Tag::new("user-1", "Rust");
        repo.insert(&tag).await.unwrap();

        let found = repo.find_by_name("user-1", "rust").await.unwrap().unwrap();
        assert_eq!(found.id, tag.id);

        let renamed = repo.rename(&tag.id, "Systems").await.unwrap().unwrap();
        assert_eq!(renamed.name, "systems");
        assert_eq!(renamed.sync_status, SyncStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tag_soft_delete_hides_from_list() {
        let db = setup().await;
        let repo = LibSqlTagRepository::new(db.connection());

        let tag = Tag::new("user-1", "temp");
        repo.insert(&tag).await.unwrap();
        assert!(repo.soft_delete(&tag.id).await.unwrap());

        assert!(repo.list("user-1").await.unwrap().is_empty());
        assert!(repo.get(&tag.id).await.unwrap().unwrap().is_deleted());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_source_update_and_pending() {
        let db = setup().await;
        let repo = LibSqlSourceRepository::new(db.connection());

        let source = Source::new("user-1", "The Rust Book", None, Some("book".to_string()));
        repo.insert(&source).await.unwrap();
        repo.mark_synced(&source.id).await.unwrap();

        let patch = SourcePatch {
            url: Some(Some("https://doc.rust-lang.org/book".to_string())),
            ..SourcePatch::default()
        };
        let updated = repo.update(&source.id, &patch).await.unwrap().unwrap();
        assert_eq!(
            updated.url.as_deref(),
            Some("https://doc.rust-lang.org/book")
        );

        let pending = repo.pending("user-1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, source.id);
    }

    async fn insert_entry(db: &Database) -> String {
        let repo = crate::db::LibSqlEntryRepository::new(db.connection());
        let entry = Entry::new("user-1", "Entry", "body");
        repo.insert(&entry).await.unwrap();
        entry.id
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_links_hard_delete_and_join() {
        let db = setup().await;
        let entries = insert_entry(&db).await;
        let tags = LibSqlTagRepository::new(db.connection());
        let links = LibSqlLinkRepository::new(db.connection());

        let tag = Tag::new("user-1", "rust");
        tags.insert(&tag).await.unwrap();

        let link = EntryTag::new("user-1", entries.clone(), tag.id.clone());
        links.insert_entry_tag(&link).await.unwrap();

        let found = links.tags_for_entry(&entries).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "rust");

        assert!(links.delete_entry_tag(&link.id).await.unwrap());
        assert!(links.get_entry_tag(&link.id).await.unwrap().is_none());
        assert!(links.tags_for_entry(&entries).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_link_is_ignored() {
        let db = setup().await;
        let entry_id = insert_entry(&db).await;
        let links = LibSqlLinkRepository::new(db.connection());

        let first = EntryTag::new("user-1", entry_id.clone(), "t1");
        let second = EntryTag::new("user-1", entry_id.clone(), "t1");
        links.insert_entry_tag(&first).await.unwrap();
        links.insert_entry_tag(&second).await.unwrap();

        assert!(links.find_entry_tag(&entry_id, "t1").await.unwrap().is_some());
        assert!(links.get_entry_tag(&second.id).await.unwrap().is_none());
    }
}
