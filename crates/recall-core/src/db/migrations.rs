//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // inside a transaction for atomicity
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: entries, tags, sources, and link tables
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Entries table
        "CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            starred INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            last_synced_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_entries_user_updated ON entries(user_id, updated_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_entries_sync_status ON entries(sync_status)",
        "CREATE INDEX IF NOT EXISTS idx_entries_deleted ON entries(deleted_at)",
        // Tags table
        "CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL COLLATE NOCASE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            last_synced_at INTEGER,
            UNIQUE(user_id, name)
        )",
        "CREATE INDEX IF NOT EXISTS idx_tags_sync_status ON tags(sync_status)",
        // Sources table
        "CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            url TEXT,
            kind TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            last_synced_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_sources_sync_status ON sources(sync_status)",
        // Entry-Tag junction table (hard delete)
        "CREATE TABLE IF NOT EXISTS entry_tags (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            entry_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            last_synced_at INTEGER,
            UNIQUE(entry_id, tag_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_entry_tags_tag ON entry_tags(tag_id)",
        // Entry-Source junction table (hard delete)
        "CREATE TABLE IF NOT EXISTS entry_sources (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            entry_id TEXT NOT NULL,
            source_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            last_synced_at INTEGER,
            UNIQUE(entry_id, source_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_entry_sources_source ON entry_sources(source_id)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: spaced-repetition review state and event log
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS review_states (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            entry_id TEXT NOT NULL UNIQUE,
            ease_factor REAL NOT NULL,
            interval_days INTEGER NOT NULL,
            repetition_count INTEGER NOT NULL,
            lapse_count INTEGER NOT NULL,
            next_due_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            last_synced_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_review_states_due ON review_states(user_id, next_due_at)",
        "CREATE INDEX IF NOT EXISTS idx_review_states_sync_status ON review_states(sync_status)",
        // Append-only review event log (hard delete table)
        "CREATE TABLE IF NOT EXISTS review_events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            entry_id TEXT NOT NULL,
            rating TEXT NOT NULL,
            interval_days INTEGER NOT NULL,
            ease_factor REAL NOT NULL,
            reviewed_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            last_synced_at INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_review_events_user_time ON review_events(user_id, reviewed_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_review_events_sync_status ON review_events(sync_status)",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
