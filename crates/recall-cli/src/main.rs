//! Recall CLI - capture entries and review them from the terminal
//!
//! Works fully offline; `recall sync` reconciles with the remote API when
//! credentials are configured.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Local, Offset, Utc};
use clap::{Parser, Subcommand};
use recall_core::db::{EntryFilter, LocalStore, QueueMode};
use recall_core::models::{
    ConflictStrategy, Entry, EntryPatch, ReviewRating, SyncResult,
};
use recall_core::remote::{HttpRemoteApi, RemoteConfig};
use recall_core::sync::{ConflictStore, PendingOperationLog, SyncOptions, SyncService};
use serde::Serialize;
use thiserror::Error;

const LIST_PAGE_SIZE: usize = 500;
const ID_PREVIEW_CHARS: usize = 13;

#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Capture and review learning entries from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Owner of the local data (defaults to RECALL_USER or "default")
    #[arg(long, value_name = "ID")]
    user: Option<String>,

    /// Quick capture: recall "something worth remembering"
    #[arg(trailing_var_arg = true)]
    entry: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new entry
    #[command(alias = "new")]
    Add {
        /// Entry content
        content: Vec<String>,
    },
    /// List recent entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Filter by tag name
        #[arg(long)]
        tag: Option<String>,
        /// Only starred entries
        #[arg(long)]
        starred: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Soft-delete an entry
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Star or unstar an entry
    Star {
        /// Entry ID or unique ID prefix
        id: String,
        /// Remove the star instead
        #[arg(long)]
        off: bool,
    },
    /// Tag or untag an entry
    Tag {
        /// Entry ID or unique ID prefix
        id: String,
        /// Tag name
        name: String,
        /// Remove the tag instead
        #[arg(long)]
        remove: bool,
    },
    /// Spaced-repetition review
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// Sync with the remote API
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Show the review queue
    Queue {
        /// Queue mode: due, new, starred, unreviewed, all
        #[arg(long, default_value = "due")]
        mode: String,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Record a review rating for an entry
    Mark {
        /// Entry ID or unique ID prefix
        id: String,
        /// Rating: again, hard, good, easy
        rating: String,
    },
    /// Push an entry's next review out
    Snooze {
        /// Entry ID or unique ID prefix
        id: String,
        /// Days to postpone (or use --preset)
        #[arg(long, conflicts_with = "preset")]
        days: Option<i64>,
        /// Preset: tomorrow, three-days, week
        #[arg(long)]
        preset: Option<String>,
    },
    /// Show today's review stats
    Stats,
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Run a full sync pass (default)
    Run {
        /// Conflict strategy: local, remote, manual
        #[arg(long, default_value = "manual")]
        strategy: String,
        /// Only download records changed since the last sync
        #[arg(long)]
        incremental: bool,
    },
    /// Show sync metadata
    Status,
    /// List recorded conflicts
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a recorded conflict
    Resolve {
        /// Conflict ID
        id: String,
        /// Strategy: local, remote, manual
        strategy: String,
    },
    /// One-shot bulk upload of all local data (post-login migration)
    UploadAll,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] recall_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No entry content provided")]
    EmptyContent,
    #[error("Entry not found for id/prefix: {0}")]
    EntryNotFound(String),
    #[error("{0}")]
    AmbiguousEntryId(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error(
        "Sync is not configured. Set RECALL_API_URL and RECALL_API_TOKEN to enable `recall sync`."
    )]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("recall=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let user_id = resolve_user(cli.user);

    match cli.command {
        Some(Commands::Add { content }) => run_add(&content, &user_id, &db_path).await?,
        Some(Commands::List {
            limit,
            tag,
            starred,
            json,
        }) => run_list(limit, tag.as_deref(), starred, json, &user_id, &db_path).await?,
        Some(Commands::Delete { id }) => run_delete(&id, &user_id, &db_path).await?,
        Some(Commands::Star { id, off }) => run_star(&id, off, &user_id, &db_path).await?,
        Some(Commands::Tag { id, name, remove }) => {
            run_tag(&id, &name, remove, &user_id, &db_path).await?;
        }
        Some(Commands::Review { command }) => run_review(command, &user_id, &db_path).await?,
        Some(Commands::Sync { command }) => run_sync(command, &user_id, &db_path).await?,
        None => {
            if cli.entry.is_empty() {
                use clap::CommandFactory;
                Cli::command().print_help()?;
                println!();
            } else {
                run_add(&cli.entry, &user_id, &db_path).await?;
            }
        }
    }

    Ok(())
}

async fn open_store(db_path: &PathBuf) -> Result<LocalStore, CliError> {
    let state_dir = db_path
        .parent()
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    let log = PendingOperationLog::open(state_dir.join("pending_operations.json"))?;
    Ok(LocalStore::open_path(db_path.clone(), log).await?)
}

async fn open_sync_service(db_path: &PathBuf) -> Result<SyncService, CliError> {
    let config = remote_config_from_env().ok_or(CliError::SyncNotConfigured)?;
    tracing::info!("Sync enabled against {}", config.base_url);
    let remote = Arc::new(HttpRemoteApi::new(config)?);

    let store = open_store(db_path).await?;
    let state_dir = db_path
        .parent()
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    let conflicts = ConflictStore::open(state_dir.join("sync_conflicts.json"))?;
    Ok(SyncService::open(
        store,
        remote,
        conflicts,
        state_dir.join("sync_state.json"),
    )?)
}

async fn run_add(content_parts: &[String], user_id: &str, db_path: &PathBuf) -> Result<(), CliError> {
    let content = normalize_content(&content_parts.join(" ")).ok_or(CliError::EmptyContent)?;
    let title = derive_title(&content);

    let store = open_store(db_path).await?;
    let entry = store.create_entry(user_id, &title, &content).await?;

    println!("{}", entry.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct EntryListItem {
    id: String,
    preview: String,
    content: String,
    starred: bool,
    created_at: i64,
    updated_at: i64,
    relative_time: String,
    sync_status: String,
}

async fn run_list(
    limit: usize,
    tag: Option<&str>,
    starred: bool,
    as_json: bool,
    user_id: &str,
    db_path: &PathBuf,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;

    let tag_id = match tag {
        Some(name) => {
            let tags = store.list_tags(user_id).await?;
            let Some(tag) = tags.iter().find(|t| t.name == name.to_lowercase()) else {
                // Unknown tag: nothing to list
                return Ok(());
            };
            Some(tag.id.clone())
        }
        None => None,
    };

    let filter = EntryFilter {
        tag_id,
        starred: starred.then_some(true),
        ..EntryFilter::default()
    };
    let page = store.list_entries(user_id, &filter, None, limit).await?;

    if as_json {
        let items: Vec<EntryListItem> = page.entries.iter().map(entry_to_list_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_entry_lines(&page.entries) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_delete(id: &str, user_id: &str, db_path: &PathBuf) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let entry = resolve_entry(&store, user_id, id).await?;
    store.delete_entry(&entry.id).await?;
    println!("{}", entry.id);
    Ok(())
}

async fn run_star(id: &str, off: bool, user_id: &str, db_path: &PathBuf) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let entry = resolve_entry(&store, user_id, id).await?;
    store
        .update_entry(
            &entry.id,
            &EntryPatch {
                starred: Some(!off),
                ..EntryPatch::default()
            },
        )
        .await?;
    println!("{}", entry.id);
    Ok(())
}

async fn run_tag(
    id: &str,
    name: &str,
    remove: bool,
    user_id: &str,
    db_path: &PathBuf,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let entry = resolve_entry(&store, user_id, id).await?;

    let tag = store.create_tag(user_id, name).await?;
    if remove {
        store.unlink_tag(&entry.id, &tag.id).await?;
    } else {
        store.link_tag(user_id, &entry.id, &tag.id).await?;
    }
    println!("{}", entry.id);
    Ok(())
}

async fn run_review(
    command: ReviewCommands,
    user_id: &str,
    db_path: &PathBuf,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let tz_offset = local_tz_offset_minutes();

    match command {
        ReviewCommands::Queue { mode, limit } => {
            let mode = QueueMode::from_str(&mode).map_err(CliError::InvalidValue)?;
            let entries = store.get_queue(user_id, mode, limit, tz_offset).await?;
            for line in format_entry_lines(&entries) {
                println!("{line}");
            }
        }
        ReviewCommands::Mark { id, rating } => {
            let rating = ReviewRating::from_str(&rating).map_err(CliError::InvalidValue)?;
            let entry = resolve_entry(&store, user_id, &id).await?;
            let state = store.mark_reviewed(user_id, &entry.id, rating).await?;
            println!(
                "{}  next in {}d (ease {:.2})",
                entry.id, state.interval_days, state.ease_factor
            );
        }
        ReviewCommands::Snooze { id, days, preset } => {
            let days = match (days, preset) {
                (Some(days), None) => days,
                (None, Some(preset)) => snooze_preset_days(&preset)?,
                (None, None) => snooze_preset_days("tomorrow")?,
                (Some(_), Some(_)) => unreachable!("clap rejects conflicting args"),
            };
            let entry = resolve_entry(&store, user_id, &id).await?;
            store.snooze(user_id, &entry.id, days).await?;
            println!("{}", entry.id);
        }
        ReviewCommands::Stats => {
            let today = store.get_today_stats(user_id, tz_offset).await?;
            let due = store.get_due_stats(user_id).await?;
            println!("reviewed today: {}", today.reviewed_today);
            println!("streak: {} days", today.streak_days);
            println!("due now: {}", due.due_now);
            println!("new: {}", due.new_count);
        }
    }

    Ok(())
}

async fn run_sync(
    command: Option<SyncCommands>,
    user_id: &str,
    db_path: &PathBuf,
) -> Result<(), CliError> {
    let command = command.unwrap_or(SyncCommands::Run {
        strategy: "manual".to_string(),
        incremental: false,
    });

    match command {
        SyncCommands::Run {
            strategy,
            incremental,
        } => {
            let strategy =
                ConflictStrategy::from_str(&strategy).map_err(CliError::InvalidValue)?;
            let service = open_sync_service(db_path).await?;
            let result = service
                .sync(
                    user_id,
                    SyncOptions {
                        conflict_strategy: strategy,
                        incremental,
                        on_progress: None,
                    },
                )
                .await;
            print_sync_result(&result);
        }
        SyncCommands::Status => {
            let service = open_sync_service(db_path).await?;
            let metadata = service.get_metadata().await;
            match metadata.last_sync_at {
                Some(at) => println!(
                    "last sync: {}",
                    format_relative_time(at, Utc::now().timestamp_millis())
                ),
                None => println!("last sync: never"),
            }
            if let Some(outcome) = metadata.last_outcome {
                println!("last outcome: {outcome:?}");
            }
            println!("pending operations: {}", metadata.pending_operations);
            println!("unresolved conflicts: {}", metadata.unresolved_conflicts);
        }
        SyncCommands::Conflicts { json } => {
            let service = open_sync_service(db_path).await?;
            let conflicts = service.get_conflicts().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&conflicts)?);
            } else {
                for conflict in conflicts {
                    let status = if conflict.is_resolved() {
                        "resolved"
                    } else {
                        "unresolved"
                    };
                    println!(
                        "{}  {} {}  {}",
                        conflict.id, conflict.entity, conflict.entity_id, status
                    );
                }
            }
        }
        SyncCommands::Resolve { id, strategy } => {
            let strategy =
                ConflictStrategy::from_str(&strategy).map_err(CliError::InvalidValue)?;
            let service = open_sync_service(db_path).await?;
            service.resolve_conflict(&id, strategy).await?;
            println!("{id}");
        }
        SyncCommands::UploadAll => {
            let service = open_sync_service(db_path).await?;
            let result = service.upload_all_local_data(user_id).await;
            print_sync_result(&result);
        }
    }

    Ok(())
}

fn print_sync_result(result: &SyncResult) {
    println!(
        "uploaded {} / downloaded {} / conflicts {} / errors {} ({}ms)",
        result.uploaded,
        result.downloaded,
        result.conflicts,
        result.errors.len(),
        result.duration_ms
    );
    for error in &result.errors {
        eprintln!("  error: {}", error.message);
    }
}

async fn resolve_entry(store: &LocalStore, user_id: &str, query: &str) -> Result<Entry, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::EntryNotFound(String::new()));
    }

    if let Some(entry) = store.get_entry(query).await? {
        if !entry.is_deleted() {
            return Ok(entry);
        }
    }

    // Prefix match over non-deleted entries
    let mut matches: Vec<Entry> = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store
            .list_entries(user_id, &EntryFilter::default(), cursor.as_deref(), LIST_PAGE_SIZE)
            .await?;
        matches.extend(
            page.entries
                .into_iter()
                .filter(|entry| entry.id.starts_with(query)),
        );
        if matches.len() > 3 || !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }

    match matches.len() {
        0 => Err(CliError::EntryNotFound(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|entry| entry.id.chars().take(ID_PREVIEW_CHARS).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousEntryId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn format_entry_lines(entries: &[Entry]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let short_id = entry.id.chars().take(ID_PREVIEW_CHARS).collect::<String>();
            let preview = entry.preview(40);
            let relative_time = format_relative_time(entry.updated_at, now_ms);
            let star = if entry.starred { "*" } else { " " };
            format!("{short_id:<13} {star} {preview:<40}  {relative_time}")
        })
        .collect()
}

fn entry_to_list_item(entry: &Entry) -> EntryListItem {
    let now_ms = Utc::now().timestamp_millis();
    EntryListItem {
        id: entry.id.clone(),
        preview: entry.preview(80),
        content: entry.content.clone(),
        starred: entry.starred,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
        relative_time: format_relative_time(entry.updated_at, now_ms),
        sync_status: entry.sync_status.to_string(),
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn derive_title(content: &str) -> String {
    content
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(80)
        .collect()
}

fn snooze_preset_days(preset: &str) -> Result<i64, CliError> {
    match preset {
        "tomorrow" => Ok(1),
        "three-days" => Ok(3),
        "week" => Ok(7),
        other => Err(CliError::InvalidValue(format!(
            "unknown snooze preset: {other}"
        ))),
    }
}

fn local_tz_offset_minutes() -> i64 {
    i64::from(Local::now().offset().fix().local_minus_utc()) / 60
}

fn resolve_user(cli_user: Option<String>) -> String {
    cli_user
        .or_else(|| env::var("RECALL_USER").ok())
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| "default".to_string())
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("RECALL_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recall")
        .join("recall.db")
}

fn remote_config_from_env() -> Option<RemoteConfig> {
    let url = env::var("RECALL_API_URL").ok()?;
    let token = env::var("RECALL_API_TOKEN").ok()?;
    RemoteConfig::new(url, token).ok()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normalize_content_trims_and_rejects_empty() {
        assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
        assert_eq!(normalize_content(" \n\t "), None);
    }

    #[test]
    fn derive_title_uses_first_line() {
        assert_eq!(derive_title("first line\nsecond"), "first line");
        let long = "x".repeat(200);
        assert_eq!(derive_title(&long).chars().count(), 80);
    }

    #[test]
    fn format_relative_time_units() {
        let now = 10_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
        assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    }

    #[test]
    fn snooze_presets_map_to_days() {
        assert_eq!(snooze_preset_days("tomorrow").unwrap(), 1);
        assert_eq!(snooze_preset_days("three-days").unwrap(), 3);
        assert_eq!(snooze_preset_days("week").unwrap(), 7);
        assert!(snooze_preset_days("fortnight").is_err());
    }

    fn unique_test_db_path() -> PathBuf {
        static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("recall-cli-test-{timestamp}-{sequence}"))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_entry_supports_exact_and_prefix_id() {
        let dir = unique_test_db_path();
        let db_path = dir.join("recall.db");
        let store = open_store(&db_path).await.unwrap();

        let first = store.create_entry("user-1", "First", "First body").await.unwrap();
        let second = store.create_entry("user-1", "Second", "Second body").await.unwrap();

        let by_exact = resolve_entry(&store, "user-1", &first.id).await.unwrap();
        assert_eq!(by_exact.title, "First");

        // Local IDs share the `local-` prefix plus a time-ordered UUID; a
        // long-enough prefix is unique.
        let prefix: String = second.id.chars().take(second.id.len() - 2).collect();
        let by_prefix = resolve_entry(&store, "user-1", &prefix).await.unwrap();
        assert_eq!(by_prefix.title, "Second");

        let error = resolve_entry(&store, "user-1", "nope").await.unwrap_err();
        assert!(matches!(error, CliError::EntryNotFound(_)));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ambiguous_prefix_is_rejected() {
        let dir = unique_test_db_path();
        let db_path = dir.join("recall.db");
        let store = open_store(&db_path).await.unwrap();

        store.create_entry("user-1", "A", "body").await.unwrap();
        store.create_entry("user-1", "B", "body").await.unwrap();

        let error = resolve_entry(&store, "user-1", "local-").await.unwrap_err();
        assert!(matches!(error, CliError::AmbiguousEntryId(_)));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_requires_configuration() {
        let dir = unique_test_db_path();
        let db_path = dir.join("recall.db");

        // Explicitly clear any ambient configuration.
        std::env::remove_var("RECALL_API_URL");
        std::env::remove_var("RECALL_API_TOKEN");

        let error = open_sync_service(&db_path).await.unwrap_err();
        assert!(matches!(error, CliError::SyncNotConfigured));

        let _ = std::fs::remove_dir_all(dir);
    }
}
