//! Local database layer for Recall

mod catalog_repository;
mod connection;
mod entry_repository;
mod migrations;
mod review_repository;
mod store;

pub use catalog_repository::{LibSqlLinkRepository, LibSqlSourceRepository, LibSqlTagRepository};
pub use connection::Database;
pub use entry_repository::{EntryFilter, EntryPage, LibSqlEntryRepository};
pub use review_repository::{DueStats, LibSqlReviewRepository, QueueMode, TodayStats};
pub use store::LocalStore;
pub(crate) use store::LocalSnapshot;

use crate::error::{Error, Result};
use crate::models::SyncStatus;

/// Read a nullable INTEGER column.
pub(crate) fn opt_i64(row: &libsql::Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected integer or null in column {idx}, got {other:?}"
        ))),
    }
}

/// Read a nullable TEXT column.
pub(crate) fn opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected text or null in column {idx}, got {other:?}"
        ))),
    }
}

/// Parse a `sync_status` column value.
pub(crate) fn parse_sync_status(raw: &str) -> Result<SyncStatus> {
    raw.parse().map_err(Error::Database)
}
