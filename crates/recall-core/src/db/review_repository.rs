//! Review state/event repository and queue queries.

use std::str::FromStr;

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{ReviewEvent, ReviewRating, ReviewState, SyncStatus};
use crate::review::{self, Schedule};
use crate::util::now_ms;

use super::{opt_i64, parse_sync_status};

/// Which entries the review queue returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Entries whose next review falls within the caller's current local day
    Due,
    /// Entries that have never been reviewed
    New,
    /// Starred entries
    Starred,
    /// Entries with no completed repetition yet
    Unreviewed,
    /// Every non-deleted entry
    All,
}

impl FromStr for QueueMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "due" => Ok(Self::Due),
            "new" => Ok(Self::New),
            "starred" => Ok(Self::Starred),
            "unreviewed" => Ok(Self::Unreviewed),
            "all" => Ok(Self::All),
            other => Err(format!("unknown queue mode: {other}")),
        }
    }
}

/// Today's review activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TodayStats {
    pub reviewed_today: usize,
    pub streak_days: u32,
}

/// Workload counts for the review dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueStats {
    pub due_now: usize,
    pub new_count: usize,
}

const STATE_COLUMNS: &str = "id, user_id, entry_id, ease_factor, interval_days, \
     repetition_count, lapse_count, next_due_at, created_at, updated_at, \
     sync_status, last_synced_at";

const EVENT_COLUMNS: &str =
    "id, user_id, entry_id, rating, interval_days, ease_factor, reviewed_at, \
     sync_status, last_synced_at";

/// libSQL implementation of review storage
pub struct LibSqlReviewRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlReviewRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_state(row: &libsql::Row) -> Result<ReviewState> {
        Ok(ReviewState {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entry_id: row.get(2)?,
            ease_factor: row.get(3)?,
            interval_days: row.get(4)?,
            repetition_count: row.get(5)?,
            lapse_count: row.get(6)?,
            next_due_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            sync_status: parse_sync_status(&row.get::<String>(10)?)?,
            last_synced_at: opt_i64(row, 11)?,
        })
    }

    fn parse_event(row: &libsql::Row) -> Result<ReviewEvent> {
        let rating: String = row.get(3)?;
        Ok(ReviewEvent {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entry_id: row.get(2)?,
            rating: rating.parse().map_err(Error::Database)?,
            interval_days: row.get(4)?,
            ease_factor: row.get(5)?,
            reviewed_at: row.get(6)?,
            sync_status: parse_sync_status(&row.get::<String>(7)?)?,
            last_synced_at: opt_i64(row, 8)?,
        })
    }

    pub async fn state_for_entry(&self, entry_id: &str) -> Result<Option<ReviewState>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {STATE_COLUMNS} FROM review_states WHERE entry_id = ?"),
                libsql::params![entry_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_state(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_state(&self, id: &str) -> Result<Option<ReviewState>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {STATE_COLUMNS} FROM review_states WHERE id = ?"),
                libsql::params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_state(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<ReviewEvent>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM review_events WHERE id = ?"),
                libsql::params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_event(&row)?)),
            None => Ok(None),
        }
    }

    async fn entry_exists(&self, entry_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM entries WHERE id = ? AND deleted_at IS NULL",
                libsql::params![entry_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Apply a review rating to an entry.
    ///
    /// Lazily creates the per-entry state snapshot on the first review,
    /// applies one scheduling step, and appends an immutable event row.
    /// Both rows come out `pending` so the next sync pushes them.
    pub async fn mark_reviewed(
        &self,
        user_id: &str,
        entry_id: &str,
        rating: ReviewRating,
    ) -> Result<(ReviewState, ReviewEvent)> {
        if !self.entry_exists(entry_id).await? {
            return Err(Error::NotFound(entry_id.to_string()));
        }

        let now = now_ms();
        let existing = self.state_for_entry(entry_id).await?;

        let current = existing.as_ref().map_or_else(Schedule::initial, |state| Schedule {
            ease_factor: state.ease_factor,
            interval_days: state.interval_days,
            repetition_count: state.repetition_count,
            lapse_count: state.lapse_count,
        });
        let next = review::next_schedule(&current, rating);
        let next_due_at = review::next_due_at(now, next.interval_days);

        let state = if let Some(mut state) = existing {
            state.ease_factor = next.ease_factor;
            state.interval_days = next.interval_days;
            state.repetition_count = next.repetition_count;
            state.lapse_count = next.lapse_count;
            state.next_due_at = next_due_at;
            state.updated_at = now;
            state.sync_status = SyncStatus::Pending;

            self.conn
                .execute(
                    "UPDATE review_states SET ease_factor = ?, interval_days = ?,
                         repetition_count = ?, lapse_count = ?, next_due_at = ?,
                         updated_at = ?, sync_status = 'pending'
                     WHERE id = ?",
                    libsql::params![
                        state.ease_factor,
                        state.interval_days,
                        state.repetition_count,
                        state.lapse_count,
                        state.next_due_at,
                        state.updated_at,
                        state.id.as_str(),
                    ],
                )
                .await?;
            state
        } else {
            let mut state = ReviewState::new(user_id, entry_id);
            state.ease_factor = next.ease_factor;
            state.interval_days = next.interval_days;
            state.repetition_count = next.repetition_count;
            state.lapse_count = next.lapse_count;
            state.next_due_at = next_due_at;
            self.insert_state(&state).await?;
            state
        };

        let event = ReviewEvent::new(
            user_id,
            entry_id,
            rating,
            next.interval_days,
            next.ease_factor,
            now,
        );
        self.insert_event(&event).await?;

        Ok((state, event))
    }

    /// Push an entry's next due date out by `days` without reviewing it.
    ///
    /// Lazily creates the state row for never-reviewed entries.
    pub async fn snooze(&self, user_id: &str, entry_id: &str, days: i64) -> Result<ReviewState> {
        if !self.entry_exists(entry_id).await? {
            return Err(Error::NotFound(entry_id.to_string()));
        }
        if days < 1 {
            return Err(Error::InvalidInput("snooze must be at least one day".into()));
        }

        let now = now_ms();
        let next_due_at = review::next_due_at(now, days);

        if let Some(mut state) = self.state_for_entry(entry_id).await? {
            state.next_due_at = next_due_at;
            state.updated_at = now;
            state.sync_status = SyncStatus::Pending;
            self.conn
                .execute(
                    "UPDATE review_states SET next_due_at = ?, updated_at = ?,
                         sync_status = 'pending' WHERE id = ?",
                    libsql::params![state.next_due_at, state.updated_at, state.id.as_str()],
                )
                .await?;
            Ok(state)
        } else {
            let mut state = ReviewState::new(user_id, entry_id);
            state.next_due_at = next_due_at;
            self.insert_state(&state).await?;
            Ok(state)
        }
    }

    /// Entries to review, picked by mode.
    pub async fn queue(
        &self,
        user_id: &str,
        mode: QueueMode,
        limit: usize,
        tz_offset_minutes: i64,
    ) -> Result<Vec<crate::models::Entry>> {
        let now = now_ms();
        let due_cutoff = review::local_day_end(now, tz_offset_minutes);

        let entry_cols = "e.id, e.user_id, e.title, e.content, e.starred, e.version, \
             e.created_at, e.updated_at, e.deleted_at, e.sync_status, e.last_synced_at";

        let (sql, params): (String, Vec<libsql::Value>) = match mode {
            QueueMode::Due => (
                format!(
                    "SELECT {entry_cols} FROM entries e
                     JOIN review_states rs ON rs.entry_id = e.id
                     WHERE e.user_id = ? AND e.deleted_at IS NULL AND rs.next_due_at < ?
                     ORDER BY rs.next_due_at ASC LIMIT ?"
                ),
                vec![user_id.into(), due_cutoff.into(), (limit as i64).into()],
            ),
            QueueMode::New => (
                format!(
                    "SELECT {entry_cols} FROM entries e
                     LEFT JOIN review_states rs ON rs.entry_id = e.id
                     WHERE e.user_id = ? AND e.deleted_at IS NULL AND rs.id IS NULL
                     ORDER BY e.created_at DESC LIMIT ?"
                ),
                vec![user_id.into(), (limit as i64).into()],
            ),
            QueueMode::Starred => (
                format!(
                    "SELECT {entry_cols} FROM entries e
                     WHERE e.user_id = ? AND e.deleted_at IS NULL AND e.starred = 1
                     ORDER BY e.updated_at DESC LIMIT ?"
                ),
                vec![user_id.into(), (limit as i64).into()],
            ),
            QueueMode::Unreviewed => (
                format!(
                    "SELECT {entry_cols} FROM entries e
                     LEFT JOIN review_states rs ON rs.entry_id = e.id
                     WHERE e.user_id = ? AND e.deleted_at IS NULL
                       AND (rs.id IS NULL OR rs.repetition_count = 0)
                     ORDER BY e.created_at DESC LIMIT ?"
                ),
                vec![user_id.into(), (limit as i64).into()],
            ),
            QueueMode::All => (
                format!(
                    "SELECT {entry_cols} FROM entries e
                     WHERE e.user_id = ? AND e.deleted_at IS NULL
                     ORDER BY e.updated_at DESC LIMIT ?"
                ),
                vec![user_id.into(), (limit as i64).into()],
            ),
        };

        let mut rows = self
            .conn
            .query(&sql, libsql::params_from_iter(params))
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(crate::models::Entry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
                content: row.get(3)?,
                starred: row.get::<i32>(4)? != 0,
                version: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
                deleted_at: opt_i64(&row, 8)?,
                sync_status: parse_sync_status(&row.get::<String>(9)?)?,
                last_synced_at: opt_i64(&row, 10)?,
            });
        }
        Ok(entries)
    }

    /// Count of reviews performed today (caller's timezone) plus the streak.
    pub async fn today_stats(&self, user_id: &str, tz_offset_minutes: i64) -> Result<TodayStats> {
        let now = now_ms();
        let day_start = review::local_day_start(now, tz_offset_minutes);
        let day_end = review::local_day_end(now, tz_offset_minutes);

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM review_events
                 WHERE user_id = ? AND reviewed_at >= ? AND reviewed_at < ?",
                libsql::params![user_id, day_start, day_end],
            )
            .await?;
        let reviewed_today: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        let reviewed_at = self.reviewed_at_values(user_id).await?;
        let streak = review::streak_days(&reviewed_at, now, tz_offset_minutes);

        Ok(TodayStats {
            reviewed_today: usize::try_from(reviewed_today).unwrap_or_default(),
            streak_days: streak,
        })
    }

    /// Due-now and never-reviewed counts.
    pub async fn due_stats(&self, user_id: &str) -> Result<DueStats> {
        let now = now_ms();

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM review_states rs
                 JOIN entries e ON e.id = rs.entry_id
                 WHERE rs.user_id = ? AND e.deleted_at IS NULL AND rs.next_due_at <= ?",
                libsql::params![user_id, now],
            )
            .await?;
        let due_now: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM entries e
                 LEFT JOIN review_states rs ON rs.entry_id = e.id
                 WHERE e.user_id = ? AND e.deleted_at IS NULL AND rs.id IS NULL",
                libsql::params![user_id],
            )
            .await?;
        let new_count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        Ok(DueStats {
            due_now: usize::try_from(due_now).unwrap_or_default(),
            new_count: usize::try_from(new_count).unwrap_or_default(),
        })
    }

    /// All review timestamps for a user (streak input).
    pub async fn reviewed_at_values(&self, user_id: &str) -> Result<Vec<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT reviewed_at FROM review_events WHERE user_id = ?",
                libsql::params![user_id],
            )
            .await?;

        let mut values = Vec::new();
        while let Some(row) = rows.next().await? {
            values.push(row.get(0)?);
        }
        Ok(values)
    }

    pub async fn insert_state(&self, state: &ReviewState) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO review_states ({STATE_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                libsql::params![
                    state.id.as_str(),
                    state.user_id.as_str(),
                    state.entry_id.as_str(),
                    state.ease_factor,
                    state.interval_days,
                    state.repetition_count,
                    state.lapse_count,
                    state.next_due_at,
                    state.created_at,
                    state.updated_at,
                    state.sync_status.as_str(),
                    state.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn insert_event(&self, event: &ReviewEvent) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO review_events ({EVENT_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                libsql::params![
                    event.id.as_str(),
                    event.user_id.as_str(),
                    event.entry_id.as_str(),
                    event.rating.as_str(),
                    event.interval_days,
                    event.ease_factor,
                    event.reviewed_at,
                    event.sync_status.as_str(),
                    event.last_synced_at,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn pending_states(&self, user_id: &str) -> Result<Vec<ReviewState>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {STATE_COLUMNS} FROM review_states
                     WHERE user_id = ? AND sync_status = 'pending'
                     ORDER BY updated_at ASC"
                ),
                libsql::params![user_id],
            )
            .await?;

        let mut states = Vec::new();
        while let Some(row) = rows.next().await? {
            states.push(Self::parse_state(&row)?);
        }
        Ok(states)
    }

    pub async fn pending_events(&self, user_id: &str) -> Result<Vec<ReviewEvent>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM review_events
                     WHERE user_id = ? AND sync_status = 'pending'
                     ORDER BY reviewed_at ASC"
                ),
                libsql::params![user_id],
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(Self::parse_event(&row)?);
        }
        Ok(events)
    }

    pub async fn mark_state_synced(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE review_states SET sync_status = 'synced', last_synced_at = ? WHERE id = ?",
                libsql::params![now_ms(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    pub async fn mark_event_synced(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE review_events SET sync_status = 'synced', last_synced_at = ? WHERE id = ?",
                libsql::params![now_ms(), id],
            )
            .await?;
        Ok(rows > 0)
    }

    /// Overwrite (or insert) a state row with the server's version.
    ///
    /// The `entry_id` uniqueness constraint means a server row for an entry
    /// we already track replaces the local snapshot wholesale.
    pub async fn apply_remote_state(&self, state: &ReviewState) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM review_states WHERE entry_id = ? AND id != ?",
                libsql::params![state.entry_id.as_str(), state.id.as_str()],
            )
            .await?;
        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO review_states ({STATE_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'synced', ?)"
                ),
                libsql::params![
                    state.id.as_str(),
                    state.user_id.as_str(),
                    state.entry_id.as_str(),
                    state.ease_factor,
                    state.interval_days,
                    state.repetition_count,
                    state.lapse_count,
                    state.next_due_at,
                    state.created_at,
                    state.updated_at,
                    now_ms(),
                ],
            )
            .await?;
        Ok(())
    }

    /// Insert a remote event row; events are immutable so an existing row
    /// is left untouched.
    pub async fn apply_remote_event(&self, event: &ReviewEvent) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO review_events ({EVENT_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, 'synced', ?)"
                ),
                libsql::params![
                    event.id.as_str(),
                    event.user_id.as_str(),
                    event.entry_id.as_str(),
                    event.rating.as_str(),
                    event.interval_days,
                    event.ease_factor,
                    event.reviewed_at,
                    now_ms(),
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{Database, LibSqlEntryRepository};
    use crate::models::Entry;
    use crate::review::EASE_DEFAULT;

    async fn setup_with_entry() -> (Database, String) {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlEntryRepository::new(db.connection());
        let entry = Entry::new("user-1", "Entry", "body");
        repo.insert(&entry).await.unwrap();
        (db, entry.id)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_review_creates_state_lazily() {
        let (db, entry_id) = setup_with_entry().await;
        let repo = LibSqlReviewRepository::new(db.connection());

        assert!(repo.state_for_entry(&entry_id).await.unwrap().is_none());

        let (state, event) = repo
            .mark_reviewed("user-1", &entry_id, ReviewRating::Good)
            .await
            .unwrap();

        assert_eq!(state.interval_days, 1);
        assert_eq!(state.repetition_count, 1);
        assert_eq!(state.ease_factor, EASE_DEFAULT);
        assert_eq!(state.sync_status, SyncStatus::Pending);
        assert_eq!(event.interval_days, 1);
        assert_eq!(event.rating, ReviewRating::Good);

        // Exactly one state row per entry
        let again = repo.state_for_entry(&entry_id).await.unwrap().unwrap();
        assert_eq!(again.id, state.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_repeated_reviews_update_single_state() {
        let (db, entry_id) = setup_with_entry().await;
        let repo = LibSqlReviewRepository::new(db.connection());

        repo.mark_reviewed("user-1", &entry_id, ReviewRating::Good)
            .await
            .unwrap();
        let (state, _) = repo
            .mark_reviewed("user-1", &entry_id, ReviewRating::Again)
            .await
            .unwrap();

        assert_eq!(state.lapse_count, 1);
        assert_eq!(state.repetition_count, 0);
        assert_eq!(state.ease_factor, 2.3);

        let events = repo.reviewed_at_values("user-1").await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_review_missing_entry_fails() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlReviewRepository::new(db.connection());

        let error = repo
            .mark_reviewed("user-1", "missing", ReviewRating::Good)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snooze_pushes_due_date() {
        let (db, entry_id) = setup_with_entry().await;
        let repo = LibSqlReviewRepository::new(db.connection());

        let state = repo.snooze("user-1", &entry_id, 3).await.unwrap();
        assert!(state.next_due_at > now_ms() + 2 * 24 * 60 * 60 * 1000);

        assert!(matches!(
            repo.snooze("user-1", &entry_id, 0).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_modes() {
        let (db, reviewed_id) = setup_with_entry().await;
        let entries = LibSqlEntryRepository::new(db.connection());
        let repo = LibSqlReviewRepository::new(db.connection());

        let mut starred = Entry::new("user-1", "Starred", "body");
        starred.starred = true;
        entries.insert(&starred).await.unwrap();

        // Review one entry with "again" so it is due tomorrow (within no
        // queue window) and the other stays new.
        repo.mark_reviewed("user-1", &reviewed_id, ReviewRating::Good)
            .await
            .unwrap();

        let new_queue = repo.queue("user-1", QueueMode::New, 10, 0).await.unwrap();
        assert_eq!(new_queue.len(), 1);
        assert_eq!(new_queue[0].title, "Starred");

        let starred_queue = repo.queue("user-1", QueueMode::Starred, 10, 0).await.unwrap();
        assert_eq!(starred_queue.len(), 1);

        let all_queue = repo.queue("user-1", QueueMode::All, 10, 0).await.unwrap();
        assert_eq!(all_queue.len(), 2);

        // The reviewed entry has repetition_count = 1, so only the new one
        // counts as unreviewed.
        let unreviewed = repo
            .queue("user-1", QueueMode::Unreviewed, 10, 0)
            .await
            .unwrap();
        assert_eq!(unreviewed.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_due_queue_includes_snoozed_out_entries_only_when_due() {
        let (db, entry_id) = setup_with_entry().await;
        let repo = LibSqlReviewRepository::new(db.connection());

        repo.snooze("user-1", &entry_id, 30).await.unwrap();
        let due = repo.queue("user-1", QueueMode::Due, 10, 0).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_today_and_due_stats() {
        let (db, entry_id) = setup_with_entry().await;
        let entries = LibSqlEntryRepository::new(db.connection());
        let repo = LibSqlReviewRepository::new(db.connection());

        entries
            .insert(&Entry::new("user-1", "Fresh", "never reviewed"))
            .await
            .unwrap();

        repo.mark_reviewed("user-1", &entry_id, ReviewRating::Good)
            .await
            .unwrap();

        let today = repo.today_stats("user-1", 0).await.unwrap();
        assert_eq!(today.reviewed_today, 1);
        assert_eq!(today.streak_days, 1);

        let due = repo.due_stats("user-1").await.unwrap();
        assert_eq!(due.new_count, 1);
        assert_eq!(due.due_now, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_apply_remote_event_is_idempotent() {
        let (db, entry_id) = setup_with_entry().await;
        let repo = LibSqlReviewRepository::new(db.connection());

        let event = ReviewEvent::new("user-1", &entry_id, ReviewRating::Easy, 2, 2.65, 1_000);
        repo.apply_remote_event(&event).await.unwrap();
        repo.apply_remote_event(&event).await.unwrap();

        assert_eq!(repo.reviewed_at_values("user-1").await.unwrap().len(), 1);
    }
}
