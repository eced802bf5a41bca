//! Shared local-store service used across clients.
//!
//! Wraps the database behind a cloneable handle and pairs every local
//! mutation with a pending-operation enqueue: the write is the durable
//! optimistic commit, the queue entry is what eventually reaches the
//! server. Read paths go straight to the repositories.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::{
    Database, DueStats, EntryFilter, EntryPage, LibSqlEntryRepository, LibSqlLinkRepository,
    LibSqlReviewRepository, LibSqlSourceRepository, LibSqlTagRepository, QueueMode, TodayStats,
};
use crate::error::{Error, Result};
use crate::models::{
    EntityKind, Entry, EntryPatch, EntrySource, EntryTag, OperationKind, ReviewRating,
    ReviewState, Source, SourcePatch, SyncStatus, Tag,
};
use crate::sync::PendingOperationLog;

/// What the download phase needs to know about a local record.
#[derive(Debug, Clone)]
pub(crate) struct LocalSnapshot {
    pub sync_status: SyncStatus,
    pub updated_at: i64,
    pub payload: Value,
}

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    log: PendingOperationLog,
}

impl LocalStore {
    /// Open a local store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>, log: PendingOperationLog) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            log,
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory(log: PendingOperationLog) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            log,
        })
    }

    /// The pending-operation log this store enqueues into.
    #[must_use]
    pub fn pending_log(&self) -> &PendingOperationLog {
        &self.log
    }

    async fn enqueue(
        &self,
        entity: EntityKind,
        entity_id: &str,
        kind: OperationKind,
        payload: Value,
    ) -> Result<()> {
        self.log.add(entity, entity_id, kind, payload).await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------

    /// Create an entry (durable local commit + queued upload).
    pub async fn create_entry(
        &self,
        user_id: &str,
        title: &str,
        content: &str,
    ) -> Result<Entry> {
        let entry = Entry::new(user_id, title, content);
        {
            let db = self.db.lock().await;
            LibSqlEntryRepository::new(db.connection())
                .insert(&entry)
                .await?;
        }
        self.enqueue(
            EntityKind::Entry,
            &entry.id,
            OperationKind::Create,
            serde_json::to_value(&entry)?,
        )
        .await?;
        Ok(entry)
    }

    pub async fn get_entry(&self, id: &str) -> Result<Option<Entry>> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection()).get(id).await
    }

    pub async fn list_entries(
        &self,
        user_id: &str,
        filter: &EntryFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<EntryPage> {
        let db = self.db.lock().await;
        LibSqlEntryRepository::new(db.connection())
            .list(user_id, filter, cursor, limit)
            .await
    }

    pub async fn update_entry(&self, id: &str, patch: &EntryPatch) -> Result<Option<Entry>> {
        let updated = {
            let db = self.db.lock().await;
            LibSqlEntryRepository::new(db.connection())
                .update(id, patch)
                .await?
        };

        if let Some(entry) = &updated {
            self.enqueue(
                EntityKind::Entry,
                &entry.id,
                OperationKind::Update,
                serde_json::to_value(entry)?,
            )
            .await?;
        }
        Ok(updated)
    }

    /// Soft-delete an entry; returns `false` when absent or already deleted.
    pub async fn delete_entry(&self, id: &str) -> Result<bool> {
        let deleted = {
            let db = self.db.lock().await;
            LibSqlEntryRepository::new(db.connection())
                .soft_delete(id)
                .await?
        };
        if !deleted {
            return Ok(false);
        }

        let snapshot = self
            .get_entry(id)
            .await?
            .map(|entry| serde_json::to_value(&entry))
            .transpose()?
            .unwrap_or(Value::Null);
        self.enqueue(EntityKind::Entry, id, OperationKind::Delete, snapshot)
            .await?;
        Ok(true)
    }

    // -----------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------

    /// Get or create a tag by name.
    pub async fn create_tag(&self, user_id: &str, name: &str) -> Result<Tag> {
        let existing = {
            let db = self.db.lock().await;
            LibSqlTagRepository::new(db.connection())
                .find_by_name(user_id, name)
                .await?
        };
        if let Some(tag) = existing {
            return Ok(tag);
        }

        let tag = Tag::new(user_id, name);
        if tag.name.is_empty() {
            return Err(Error::InvalidInput("tag name cannot be empty".into()));
        }
        {
            let db = self.db.lock().await;
            LibSqlTagRepository::new(db.connection()).insert(&tag).await?;
        }
        self.enqueue(
            EntityKind::Tag,
            &tag.id,
            OperationKind::Create,
            serde_json::to_value(&tag)?,
        )
        .await?;
        Ok(tag)
    }

    pub async fn get_tag(&self, id: &str) -> Result<Option<Tag>> {
        let db = self.db.lock().await;
        LibSqlTagRepository::new(db.connection()).get(id).await
    }

    pub async fn list_tags(&self, user_id: &str) -> Result<Vec<Tag>> {
        let db = self.db.lock().await;
        LibSqlTagRepository::new(db.connection()).list(user_id).await
    }

    pub async fn rename_tag(&self, id: &str, name: &str) -> Result<Option<Tag>> {
        let renamed = {
            let db = self.db.lock().await;
            LibSqlTagRepository::new(db.connection()).rename(id, name).await?
        };
        if let Some(tag) = &renamed {
            self.enqueue(
                EntityKind::Tag,
                &tag.id,
                OperationKind::Update,
                serde_json::to_value(tag)?,
            )
            .await?;
        }
        Ok(renamed)
    }

    pub async fn delete_tag(&self, id: &str) -> Result<bool> {
        let deleted = {
            let db = self.db.lock().await;
            LibSqlTagRepository::new(db.connection()).soft_delete(id).await?
        };
        if !deleted {
            return Ok(false);
        }

        let snapshot = self
            .get_tag(id)
            .await?
            .map(|tag| serde_json::to_value(&tag))
            .transpose()?
            .unwrap_or(Value::Null);
        self.enqueue(EntityKind::Tag, id, OperationKind::Delete, snapshot)
            .await?;
        Ok(true)
    }

    // -----------------------------------------------------------------
    // Sources
    // -----------------------------------------------------------------

    pub async fn create_source(
        &self,
        user_id: &str,
        title: &str,
        url: Option<String>,
        kind: Option<String>,
    ) -> Result<Source> {
        let source = Source::new(user_id, title, url, kind);
        {
            let db = self.db.lock().await;
            LibSqlSourceRepository::new(db.connection())
                .insert(&source)
                .await?;
        }
        self.enqueue(
            EntityKind::Source,
            &source.id,
            OperationKind::Create,
            serde_json::to_value(&source)?,
        )
        .await?;
        Ok(source)
    }

    pub async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let db = self.db.lock().await;
        LibSqlSourceRepository::new(db.connection()).get(id).await
    }

    pub async fn list_sources(&self, user_id: &str) -> Result<Vec<Source>> {
        let db = self.db.lock().await;
        LibSqlSourceRepository::new(db.connection()).list(user_id).await
    }

    pub async fn update_source(&self, id: &str, patch: &SourcePatch) -> Result<Option<Source>> {
        let updated = {
            let db = self.db.lock().await;
            LibSqlSourceRepository::new(db.connection())
                .update(id, patch)
                .await?
        };
        if let Some(source) = &updated {
            self.enqueue(
                EntityKind::Source,
                &source.id,
                OperationKind::Update,
                serde_json::to_value(source)?,
            )
            .await?;
        }
        Ok(updated)
    }

    pub async fn delete_source(&self, id: &str) -> Result<bool> {
        let deleted = {
            let db = self.db.lock().await;
            LibSqlSourceRepository::new(db.connection())
                .soft_delete(id)
                .await?
        };
        if !deleted {
            return Ok(false);
        }

        let snapshot = self
            .get_source(id)
            .await?
            .map(|source| serde_json::to_value(&source))
            .transpose()?
            .unwrap_or(Value::Null);
        self.enqueue(EntityKind::Source, id, OperationKind::Delete, snapshot)
            .await?;
        Ok(true)
    }

    // -----------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------

    /// Link an entry to a tag; returns the existing link when already set.
    pub async fn link_tag(&self, user_id: &str, entry_id: &str, tag_id: &str) -> Result<EntryTag> {
        let existing = {
            let db = self.db.lock().await;
            LibSqlLinkRepository::new(db.connection())
                .find_entry_tag(entry_id, tag_id)
                .await?
        };
        if let Some(link) = existing {
            return Ok(link);
        }

        let link = EntryTag::new(user_id, entry_id, tag_id);
        {
            let db = self.db.lock().await;
            LibSqlLinkRepository::new(db.connection())
                .insert_entry_tag(&link)
                .await?;
        }
        self.enqueue(
            EntityKind::EntryTag,
            &link.id,
            OperationKind::Create,
            serde_json::to_value(&link)?,
        )
        .await?;
        Ok(link)
    }

    /// Remove an entry↔tag link (hard delete).
    pub async fn unlink_tag(&self, entry_id: &str, tag_id: &str) -> Result<bool> {
        let Some(link) = ({
            let db = self.db.lock().await;
            LibSqlLinkRepository::new(db.connection())
                .find_entry_tag(entry_id, tag_id)
                .await?
        }) else {
            return Ok(false);
        };

        {
            let db = self.db.lock().await;
            LibSqlLinkRepository::new(db.connection())
                .delete_entry_tag(&link.id)
                .await?;
        }
        self.enqueue(
            EntityKind::EntryTag,
            &link.id,
            OperationKind::Delete,
            serde_json::to_value(&link)?,
        )
        .await?;
        Ok(true)
    }

    pub async fn tags_for_entry(&self, entry_id: &str) -> Result<Vec<Tag>> {
        let db = self.db.lock().await;
        LibSqlLinkRepository::new(db.connection())
            .tags_for_entry(entry_id)
            .await
    }

    pub async fn link_source(
        &self,
        user_id: &str,
        entry_id: &str,
        source_id: &str,
    ) -> Result<EntrySource> {
        let existing = {
            let db = self.db.lock().await;
            LibSqlLinkRepository::new(db.connection())
                .find_entry_source(entry_id, source_id)
                .await?
        };
        if let Some(link) = existing {
            return Ok(link);
        }

        let link = EntrySource::new(user_id, entry_id, source_id);
        {
            let db = self.db.lock().await;
            LibSqlLinkRepository::new(db.connection())
                .insert_entry_source(&link)
                .await?;
        }
        self.enqueue(
            EntityKind::EntrySource,
            &link.id,
            OperationKind::Create,
            serde_json::to_value(&link)?,
        )
        .await?;
        Ok(link)
    }

    pub async fn unlink_source(&self, entry_id: &str, source_id: &str) -> Result<bool> {
        let Some(link) = ({
            let db = self.db.lock().await;
            LibSqlLinkRepository::new(db.connection())
                .find_entry_source(entry_id, source_id)
                .await?
        }) else {
            return Ok(false);
        };

        {
            let db = self.db.lock().await;
            LibSqlLinkRepository::new(db.connection())
                .delete_entry_source(&link.id)
                .await?;
        }
        self.enqueue(
            EntityKind::EntrySource,
            &link.id,
            OperationKind::Delete,
            serde_json::to_value(&link)?,
        )
        .await?;
        Ok(true)
    }

    pub async fn sources_for_entry(&self, entry_id: &str) -> Result<Vec<Source>> {
        let db = self.db.lock().await;
        LibSqlLinkRepository::new(db.connection())
            .sources_for_entry(entry_id)
            .await
    }

    // -----------------------------------------------------------------
    // Review
    // -----------------------------------------------------------------

    /// Apply a review rating; state and event are both queued for upload.
    pub async fn mark_reviewed(
        &self,
        user_id: &str,
        entry_id: &str,
        rating: ReviewRating,
    ) -> Result<ReviewState> {
        let had_state = {
            let db = self.db.lock().await;
            LibSqlReviewRepository::new(db.connection())
                .state_for_entry(entry_id)
                .await?
                .is_some()
        };

        let (state, event) = {
            let db = self.db.lock().await;
            LibSqlReviewRepository::new(db.connection())
                .mark_reviewed(user_id, entry_id, rating)
                .await?
        };

        let state_kind = if had_state {
            OperationKind::Update
        } else {
            OperationKind::Create
        };
        self.enqueue(
            EntityKind::ReviewState,
            &state.id,
            state_kind,
            serde_json::to_value(&state)?,
        )
        .await?;
        self.enqueue(
            EntityKind::ReviewEvent,
            &event.id,
            OperationKind::Create,
            serde_json::to_value(&event)?,
        )
        .await?;

        Ok(state)
    }

    /// Push an entry's next review out by `days`.
    pub async fn snooze(&self, user_id: &str, entry_id: &str, days: i64) -> Result<ReviewState> {
        let had_state = {
            let db = self.db.lock().await;
            LibSqlReviewRepository::new(db.connection())
                .state_for_entry(entry_id)
                .await?
                .is_some()
        };

        let state = {
            let db = self.db.lock().await;
            LibSqlReviewRepository::new(db.connection())
                .snooze(user_id, entry_id, days)
                .await?
        };

        let kind = if had_state {
            OperationKind::Update
        } else {
            OperationKind::Create
        };
        self.enqueue(
            EntityKind::ReviewState,
            &state.id,
            kind,
            serde_json::to_value(&state)?,
        )
        .await?;
        Ok(state)
    }

    pub async fn get_queue(
        &self,
        user_id: &str,
        mode: QueueMode,
        limit: usize,
        tz_offset_minutes: i64,
    ) -> Result<Vec<Entry>> {
        let db = self.db.lock().await;
        LibSqlReviewRepository::new(db.connection())
            .queue(user_id, mode, limit, tz_offset_minutes)
            .await
    }

    pub async fn get_today_stats(&self, user_id: &str, tz_offset_minutes: i64) -> Result<TodayStats> {
        let db = self.db.lock().await;
        LibSqlReviewRepository::new(db.connection())
            .today_stats(user_id, tz_offset_minutes)
            .await
    }

    pub async fn get_due_stats(&self, user_id: &str) -> Result<DueStats> {
        let db = self.db.lock().await;
        LibSqlReviewRepository::new(db.connection())
            .due_stats(user_id)
            .await
    }

    // -----------------------------------------------------------------
    // Sync-engine surface
    // -----------------------------------------------------------------

    const fn table_name(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Entry => "entries",
            EntityKind::Tag => "tags",
            EntityKind::Source => "sources",
            EntityKind::EntryTag => "entry_tags",
            EntityKind::EntrySource => "entry_sources",
            EntityKind::ReviewState => "review_states",
            EntityKind::ReviewEvent => "review_events",
        }
    }

    /// Mark a record confirmed by the server.
    ///
    /// `server_id` re-keys the record when the server assigned a different
    /// canonical ID (entry creation only).
    pub async fn mark_record_synced(
        &self,
        kind: EntityKind,
        id: &str,
        server_id: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        if kind == EntityKind::Entry {
            return LibSqlEntryRepository::new(db.connection())
                .mark_synced(id, server_id)
                .await;
        }

        let rows = db
            .connection()
            .execute(
                &format!(
                    "UPDATE {} SET sync_status = 'synced', last_synced_at = ? WHERE id = ?",
                    Self::table_name(kind)
                ),
                libsql::params![crate::util::now_ms(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    /// Mark a record as diverged, awaiting conflict resolution.
    pub async fn mark_record_conflict(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db
            .connection()
            .execute(
                &format!(
                    "UPDATE {} SET sync_status = 'conflict' WHERE id = ?",
                    Self::table_name(kind)
                ),
                libsql::params![id],
            )
            .await?;
        Ok(rows > 0)
    }

    /// Look up the sync-relevant view of a local record, if it exists.
    pub(crate) async fn record_snapshot(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<LocalSnapshot>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        macro_rules! snapshot {
            ($record:expr, $updated_at:expr) => {{
                let record = $record;
                Ok(Some(LocalSnapshot {
                    sync_status: record.sync_status,
                    updated_at: $updated_at(&record),
                    payload: serde_json::to_value(&record)?,
                }))
            }};
        }

        match kind {
            EntityKind::Entry => match LibSqlEntryRepository::new(conn).get(id).await? {
                Some(entry) => snapshot!(entry, |e: &Entry| e.updated_at),
                None => Ok(None),
            },
            EntityKind::Tag => match LibSqlTagRepository::new(conn).get(id).await? {
                Some(tag) => snapshot!(tag, |t: &Tag| t.updated_at),
                None => Ok(None),
            },
            EntityKind::Source => match LibSqlSourceRepository::new(conn).get(id).await? {
                Some(source) => snapshot!(source, |s: &Source| s.updated_at),
                None => Ok(None),
            },
            EntityKind::EntryTag => match LibSqlLinkRepository::new(conn).get_entry_tag(id).await? {
                Some(link) => snapshot!(link, |l: &EntryTag| l.created_at),
                None => Ok(None),
            },
            EntityKind::EntrySource => {
                match LibSqlLinkRepository::new(conn).get_entry_source(id).await? {
                    Some(link) => snapshot!(link, |l: &EntrySource| l.created_at),
                    None => Ok(None),
                }
            }
            EntityKind::ReviewState => match LibSqlReviewRepository::new(conn).get_state(id).await? {
                Some(state) => snapshot!(state, |s: &ReviewState| s.updated_at),
                None => Ok(None),
            },
            EntityKind::ReviewEvent => match LibSqlReviewRepository::new(conn).get_event(id).await? {
                Some(event) => {
                    snapshot!(event, |e: &crate::models::ReviewEvent| e.reviewed_at)
                }
                None => Ok(None),
            },
        }
    }

    /// Overwrite (or insert) a record from its server payload, marked synced.
    pub async fn apply_remote_record(&self, kind: EntityKind, payload: &Value) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        match kind {
            EntityKind::Entry => {
                let entry: Entry = serde_json::from_value(payload.clone())?;
                LibSqlEntryRepository::new(conn).apply_remote(&entry).await
            }
            EntityKind::Tag => {
                let tag: Tag = serde_json::from_value(payload.clone())?;
                LibSqlTagRepository::new(conn).apply_remote(&tag).await
            }
            EntityKind::Source => {
                let source: Source = serde_json::from_value(payload.clone())?;
                LibSqlSourceRepository::new(conn).apply_remote(&source).await
            }
            EntityKind::EntryTag => {
                let link: EntryTag = serde_json::from_value(payload.clone())?;
                LibSqlLinkRepository::new(conn)
                    .apply_remote_entry_tag(&link)
                    .await
            }
            EntityKind::EntrySource => {
                let link: EntrySource = serde_json::from_value(payload.clone())?;
                LibSqlLinkRepository::new(conn)
                    .apply_remote_entry_source(&link)
                    .await
            }
            EntityKind::ReviewState => {
                let state: ReviewState = serde_json::from_value(payload.clone())?;
                LibSqlReviewRepository::new(conn)
                    .apply_remote_state(&state)
                    .await
            }
            EntityKind::ReviewEvent => {
                let event: crate::models::ReviewEvent = serde_json::from_value(payload.clone())?;
                LibSqlReviewRepository::new(conn)
                    .apply_remote_event(&event)
                    .await
            }
        }
    }

    /// All records of one family with unconfirmed local mutations,
    /// as `(id, snapshot)` pairs ready for upload.
    pub async fn pending_payloads(
        &self,
        kind: EntityKind,
        user_id: &str,
    ) -> Result<Vec<(String, Value)>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        fn pairs<T: serde::Serialize>(
            records: Vec<T>,
            id_of: impl Fn(&T) -> String,
        ) -> Result<Vec<(String, Value)>> {
            records
                .into_iter()
                .map(|record| Ok((id_of(&record), serde_json::to_value(&record)?)))
                .collect()
        }

        match kind {
            EntityKind::Entry => pairs(
                LibSqlEntryRepository::new(conn).pending(user_id).await?,
                |e: &Entry| e.id.clone(),
            ),
            EntityKind::Tag => pairs(
                LibSqlTagRepository::new(conn).pending(user_id).await?,
                |t: &Tag| t.id.clone(),
            ),
            EntityKind::Source => pairs(
                LibSqlSourceRepository::new(conn).pending(user_id).await?,
                |s: &Source| s.id.clone(),
            ),
            EntityKind::EntryTag => pairs(
                LibSqlLinkRepository::new(conn)
                    .pending_entry_tags(user_id)
                    .await?,
                |l: &EntryTag| l.id.clone(),
            ),
            EntityKind::EntrySource => pairs(
                LibSqlLinkRepository::new(conn)
                    .pending_entry_sources(user_id)
                    .await?,
                |l: &EntrySource| l.id.clone(),
            ),
            EntityKind::ReviewState => pairs(
                LibSqlReviewRepository::new(conn)
                    .pending_states(user_id)
                    .await?,
                |s: &ReviewState| s.id.clone(),
            ),
            EntityKind::ReviewEvent => pairs(
                LibSqlReviewRepository::new(conn)
                    .pending_events(user_id)
                    .await?,
                |e: &crate::models::ReviewEvent| e.id.clone(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    async fn store() -> LocalStore {
        LocalStore::open_in_memory(PendingOperationLog::in_memory())
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_entry_enqueues_a_create_operation() {
        let store = store().await;
        let entry = store.create_entry("user-1", "Title", "Body").await.unwrap();

        let ops = store.pending_log().get_all().await;
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].entity, EntityKind::Entry);
        assert_eq!(ops[0].entity_id, entry.id);
        assert_eq!(ops[0].kind, OperationKind::Create);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_after_create_keeps_one_create_with_final_state() {
        let store = store().await;
        let entry = store.create_entry("user-1", "Title", "v1").await.unwrap();

        store
            .update_entry(
                &entry.id,
                &EntryPatch {
                    content: Some("v2".to_string()),
                    ..EntryPatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        let ops = store.pending_log().get_all().await;
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Create);
        assert_eq!(ops[0].payload["content"], "v2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_of_unsynced_entry_clears_the_queue() {
        let store = store().await;
        let entry = store.create_entry("user-1", "Title", "Body").await.unwrap();

        assert!(store.delete_entry(&entry.id).await.unwrap());
        assert!(store.pending_log().is_empty().await);

        // The local row keeps its soft-delete marker either way.
        let fetched = store.get_entry(&entry.id).await.unwrap().unwrap();
        assert!(fetched.is_deleted());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn link_and_unlink_tag_round_trip() {
        let store = store().await;
        let entry = store.create_entry("user-1", "Title", "Body").await.unwrap();
        let tag = store.create_tag("user-1", "Rust").await.unwrap();

        let link = store.link_tag("user-1", &entry.id, &tag.id).await.unwrap();
        // Linking again returns the same link
        let again = store.link_tag("user-1", &entry.id, &tag.id).await.unwrap();
        assert_eq!(link.id, again.id);

        let tags = store.tags_for_entry(&entry.id).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "rust");

        assert!(store.unlink_tag(&entry.id, &tag.id).await.unwrap());
        assert!(store.tags_for_entry(&entry.id).await.unwrap().is_empty());
        // Created-then-deleted link annihilated in the log
        let ops = store.pending_log().get_all().await;
        assert!(ops.iter().all(|op| op.entity != EntityKind::EntryTag));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn review_enqueues_state_and_event() {
        let store = store().await;
        let entry = store.create_entry("user-1", "Title", "Body").await.unwrap();

        store
            .mark_reviewed("user-1", &entry.id, ReviewRating::Good)
            .await
            .unwrap();

        let ops = store.pending_log().get_all().await;
        let state_ops: Vec<_> = ops
            .iter()
            .filter(|op| op.entity == EntityKind::ReviewState)
            .collect();
        let event_ops: Vec<_> = ops
            .iter()
            .filter(|op| op.entity == EntityKind::ReviewEvent)
            .collect();
        assert_eq!(state_ops.len(), 1);
        assert_eq!(state_ops[0].kind, OperationKind::Create);
        assert_eq!(event_ops.len(), 1);

        // Second review coalesces into the existing state create
        store
            .mark_reviewed("user-1", &entry.id, ReviewRating::Again)
            .await
            .unwrap();
        let ops = store.pending_log().get_all().await;
        assert_eq!(
            ops.iter()
                .filter(|op| op.entity == EntityKind::ReviewState)
                .count(),
            1
        );
        assert_eq!(
            ops.iter()
                .filter(|op| op.entity == EntityKind::ReviewEvent)
                .count(),
            2
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_payloads_cover_dirty_records() {
        let store = store().await;
        let entry = store.create_entry("user-1", "Title", "Body").await.unwrap();
        store.create_tag("user-1", "rust").await.unwrap();

        let entries = store
            .pending_payloads(EntityKind::Entry, "user-1")
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, entry.id);

        store
            .mark_record_synced(EntityKind::Entry, &entry.id, None)
            .await
            .unwrap();
        assert!(store
            .pending_payloads(EntityKind::Entry, "user-1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn apply_remote_record_marks_synced() {
        let store = store().await;
        let mut remote = Entry::new("user-1", "Remote", "body");
        remote.id = "srv-1".to_string();

        store
            .apply_remote_record(EntityKind::Entry, &serde_json::to_value(&remote).unwrap())
            .await
            .unwrap();

        let fetched = store.get_entry("srv-1").await.unwrap().unwrap();
        assert_eq!(fetched.sync_status, SyncStatus::Synced);
        assert_eq!(fetched.title, "Remote");
    }
}
