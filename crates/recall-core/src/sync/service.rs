//! Sync orchestrator.
//!
//! Owns the sync state machine: drains the pending-operation log against
//! the remote API (upload phase), pulls remote records into the local
//! store (download phase), classifies and records conflicts, and reports
//! a structured result. At most one pass runs per process; a second
//! caller is rejected immediately rather than queued.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::{LocalSnapshot, LocalStore};
use crate::error::{Error, Result};
use crate::models::{
    ConflictStrategy, EntityKind, OperationKind, PendingOperation, SyncConflict, SyncErrorDetail,
    SyncMetadata, SyncOutcome, SyncPhase, SyncResult, SyncState, SyncStatus,
};
use crate::remote::{RemoteApi, RemoteError};
use crate::sync::{ConflictStore, PendingOperationLog, SubscriberId, SyncStatePublisher};
use crate::util::now_ms;

/// Advisory progress callback fired at phase boundaries.
pub type ProgressFn = Arc<dyn Fn(SyncPhase, usize, usize) + Send + Sync>;

/// Options for one sync pass.
#[derive(Clone, Default)]
pub struct SyncOptions {
    pub conflict_strategy: ConflictStrategy,
    /// Only download records changed since the last full sync
    pub incremental: bool,
    pub on_progress: Option<ProgressFn>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetaState {
    last_sync_at: Option<i64>,
    last_outcome: Option<SyncOutcome>,
}

struct MetadataFile {
    path: Option<PathBuf>,
    state: MetaState,
}

impl MetadataFile {
    fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            serde_json::from_slice(&std::fs::read(&path)?)?
        } else {
            MetaState::default()
        };
        Ok(Self {
            path: Some(path),
            state,
        })
    }

    const fn in_memory() -> Self {
        Self {
            path: None,
            state: MetaState {
                last_sync_at: None,
                last_outcome: None,
            },
        }
    }

    fn set(&mut self, outcome: SyncOutcome) -> Result<()> {
        self.state.last_sync_at = Some(now_ms());
        self.state.last_outcome = Some(outcome);
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_vec_pretty(&self.state)?)?;
        }
        Ok(())
    }
}

/// Releases the single-flight flag when a pass ends, however it ends.
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Reconciliation {
    Applied,
    LocalWins,
    Conflicted(SyncConflict),
    AlreadyConflicted,
}

/// The sync control surface exposed to UI code.
///
/// Construct one instance at process start and pass it by reference; all
/// internal state is shared behind `Arc`s, so clones are cheap handles.
#[derive(Clone)]
pub struct SyncService {
    store: LocalStore,
    remote: Arc<dyn RemoteApi>,
    log: PendingOperationLog,
    conflicts: ConflictStore,
    publisher: Arc<SyncStatePublisher>,
    meta: Arc<Mutex<MetadataFile>>,
    in_flight: Arc<AtomicBool>,
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService").finish_non_exhaustive()
    }
}

impl SyncService {
    /// Service without persistent sync metadata (primarily for tests).
    #[must_use]
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteApi>, conflicts: ConflictStore) -> Self {
        let log = store.pending_log().clone();
        Self {
            store,
            remote,
            log,
            conflicts,
            publisher: Arc::new(SyncStatePublisher::new()),
            meta: Arc::new(Mutex::new(MetadataFile::in_memory())),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Service with sync metadata persisted at the given path.
    pub fn open(
        store: LocalStore,
        remote: Arc<dyn RemoteApi>,
        conflicts: ConflictStore,
        metadata_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let log = store.pending_log().clone();
        Ok(Self {
            store,
            remote,
            log,
            conflicts,
            publisher: Arc::new(SyncStatePublisher::new()),
            meta: Arc::new(Mutex::new(MetadataFile::open(metadata_path.into())?)),
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The local store this service reconciles into.
    #[must_use]
    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.publisher.current()
    }

    /// Register a lifecycle-state listener.
    pub fn subscribe(
        &self,
        listener: impl Fn(SyncState) + Send + Sync + 'static,
    ) -> Result<SubscriberId> {
        self.publisher.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Cached timestamps plus counts re-derived from the stores.
    pub async fn get_metadata(&self) -> SyncMetadata {
        let state = self.meta.lock().await.state.clone();
        SyncMetadata {
            last_sync_at: state.last_sync_at,
            last_outcome: state.last_outcome,
            pending_operations: self.log.len().await,
            unresolved_conflicts: self.conflicts.count_unresolved().await,
        }
    }

    /// All recorded conflicts, newest first.
    pub async fn get_conflicts(&self) -> Vec<SyncConflict> {
        self.conflicts.all().await
    }

    /// Queued operations that exceeded a retry budget.
    pub async fn failed_operations(&self, max_retries: u32) -> Vec<PendingOperation> {
        self.log.failed_operations(max_retries).await
    }

    /// Fire-and-forget sync attempt after an optimistic local write.
    ///
    /// Goes through the same single-flight gate as [`Self::sync`]; an
    /// "already running" rejection or an offline failure is swallowed and
    /// left for the queue to retry on the next trigger.
    pub fn spawn_sync(&self, user_id: impl Into<String>) {
        let service = self.clone();
        let user_id = user_id.into();
        tokio::spawn(async move {
            let result = service.sync(&user_id, SyncOptions::default()).await;
            if !result.success {
                tracing::debug!(
                    errors = result.errors.len(),
                    "best-effort sync attempt deferred to queue"
                );
            }
        });
    }

    /// Run one full sync pass: upload, download, conflict recording.
    pub async fn sync(&self, user_id: &str, options: SyncOptions) -> SyncResult {
        let started = now_ms();
        let Some(_guard) = self.try_begin() else {
            return SyncResult::rejected(Error::SyncInProgress.to_string());
        };

        self.publisher.set(SyncState::Syncing);

        match self.run_pass(user_id, &options).await {
            Ok(mut result) => {
                result.duration_ms = now_ms() - started;
                result.success = result.errors.is_empty();

                let outcome = if result.errors.is_empty() {
                    SyncOutcome::Success
                } else if result.uploaded + result.downloaded > 0 {
                    SyncOutcome::Partial
                } else {
                    SyncOutcome::Failed
                };
                self.update_metadata(outcome).await;

                self.publisher.set(if result.conflicts > 0 {
                    SyncState::Conflict
                } else {
                    SyncState::Idle
                });
                progress(&options, SyncPhase::Complete, result.uploaded, result.uploaded);
                result
            }
            Err(error) => {
                // The only fatal path: storage failure aborts remaining
                // phases and surfaces as a single synthetic error.
                tracing::error!("sync pass aborted: {error}");
                self.update_metadata(SyncOutcome::Failed).await;
                self.publisher.set(SyncState::Error);
                SyncResult {
                    uploaded: 0,
                    downloaded: 0,
                    conflicts: 0,
                    errors: vec![SyncErrorDetail::general(format!("sync aborted: {error}"))],
                    duration_ms: now_ms() - started,
                    success: false,
                }
            }
        }
    }

    /// One-shot bulk upload of every pending record across all families.
    ///
    /// Used exactly once, on transition from local-only to authenticated
    /// mode: the server holds no prior copies, so no per-record conflict
    /// detection is needed.
    pub async fn upload_all_local_data(&self, user_id: &str) -> SyncResult {
        let started = now_ms();
        let Some(_guard) = self.try_begin() else {
            return SyncResult::rejected(Error::SyncInProgress.to_string());
        };

        self.publisher.set(SyncState::Syncing);

        match self.run_bulk_upload(user_id).await {
            Ok(mut result) => {
                result.duration_ms = now_ms() - started;
                result.success = result.errors.is_empty();
                let outcome = if result.success {
                    SyncOutcome::Success
                } else if result.uploaded > 0 {
                    SyncOutcome::Partial
                } else {
                    SyncOutcome::Failed
                };
                self.update_metadata(outcome).await;
                self.publisher.set(SyncState::Idle);
                result
            }
            Err(error) => {
                tracing::error!("bulk upload aborted: {error}");
                self.update_metadata(SyncOutcome::Failed).await;
                self.publisher.set(SyncState::Error);
                SyncResult {
                    uploaded: 0,
                    downloaded: 0,
                    conflicts: 0,
                    errors: vec![SyncErrorDetail::general(format!("bulk upload aborted: {error}"))],
                    duration_ms: now_ms() - started,
                    success: false,
                }
            }
        }
    }

    /// Apply a resolution strategy to a stored conflict.
    ///
    /// `Local` re-uploads the stored local snapshot, `Remote` writes the
    /// stored remote snapshot into the local store, `Manual` assumes the
    /// caller already merged externally. Resolving twice is an error.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        strategy: ConflictStrategy,
    ) -> Result<()> {
        let conflict = self
            .conflicts
            .get(conflict_id)
            .await
            .ok_or_else(|| Error::NotFound(conflict_id.to_string()))?;
        if conflict.is_resolved() {
            return Err(Error::ConflictResolved(conflict_id.to_string()));
        }

        match strategy {
            ConflictStrategy::Local => {
                match self
                    .remote
                    .update(conflict.entity, &conflict.entity_id, &conflict.local_snapshot, None)
                    .await
                {
                    Ok(_) => {}
                    Err(RemoteError::NotFound(_)) => {
                        self.remote
                            .create(conflict.entity, &conflict.local_snapshot)
                            .await?;
                    }
                    Err(error) => return Err(error.into()),
                }
                self.store
                    .mark_record_synced(conflict.entity, &conflict.entity_id, None)
                    .await?;
                self.log
                    .remove_for(conflict.entity, &conflict.entity_id)
                    .await?;
            }
            ConflictStrategy::Remote => {
                if conflict.remote_snapshot.is_null() {
                    return Err(Error::InvalidInput(
                        "conflict carries no remote snapshot to apply".to_string(),
                    ));
                }
                self.store
                    .apply_remote_record(conflict.entity, &conflict.remote_snapshot)
                    .await?;
                self.log
                    .remove_for(conflict.entity, &conflict.entity_id)
                    .await?;
            }
            ConflictStrategy::Manual => {}
        }

        self.conflicts.resolve(conflict_id, strategy).await?;

        if self.conflicts.count_unresolved().await == 0
            && self.publisher.current() == SyncState::Conflict
        {
            self.publisher.set(SyncState::Idle);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn try_begin(&self) -> Option<FlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard(Arc::clone(&self.in_flight)))
    }

    async fn update_metadata(&self, outcome: SyncOutcome) {
        if let Err(error) = self.meta.lock().await.set(outcome) {
            tracing::warn!("failed to persist sync metadata: {error}");
        }
    }

    async fn run_pass(&self, user_id: &str, options: &SyncOptions) -> Result<SyncResult> {
        let mut uploaded = 0usize;
        let mut downloaded = 0usize;
        let mut errors: Vec<SyncErrorDetail> = Vec::new();
        let mut new_conflicts: Vec<SyncConflict> = Vec::new();

        // Upload phase: drain the log in FIFO order.
        let operations = self.log.get_all().await;
        progress(options, SyncPhase::Preparing, 0, operations.len());

        for (index, op) in operations.iter().enumerate() {
            progress(options, SyncPhase::Uploading, index, operations.len());

            match self.push_operation(op).await {
                Ok(()) => {
                    self.log.remove(&op.id).await?;
                    uploaded += 1;
                }
                Err(Error::Remote(remote_error)) if remote_error.is_conflict() => {
                    self.handle_upload_conflict(
                        op,
                        options.conflict_strategy,
                        &mut uploaded,
                        &mut errors,
                        &mut new_conflicts,
                    )
                    .await?;
                }
                Err(error) => {
                    let message = error.to_string();
                    tracing::warn!(
                        entity = %op.entity,
                        entity_id = %op.entity_id,
                        "upload failed: {message}"
                    );
                    self.log.mark_failed(&op.id, &message).await?;
                    errors.push(SyncErrorDetail::for_record(op.entity, &op.entity_id, message));
                }
            }
        }

        // Download phase: reconcile every family independently.
        let since = if options.incremental {
            self.meta.lock().await.state.last_sync_at
        } else {
            None
        };

        for (index, kind) in EntityKind::ALL.iter().enumerate() {
            progress(options, SyncPhase::Downloading, index, EntityKind::ALL.len());

            let records = match self.remote.list(*kind, user_id, since).await {
                Ok(records) => records,
                Err(error) => {
                    errors.push(SyncErrorDetail::general(format!(
                        "download of {kind} records failed: {error}"
                    )));
                    continue;
                }
            };

            for record in records {
                match self
                    .reconcile_record(*kind, &record.id, record.updated_at, &record.payload, options.conflict_strategy)
                    .await
                {
                    Ok(Reconciliation::Applied) => downloaded += 1,
                    Ok(Reconciliation::LocalWins | Reconciliation::AlreadyConflicted) => {}
                    Ok(Reconciliation::Conflicted(conflict)) => new_conflicts.push(conflict),
                    Err(error) => {
                        errors.push(SyncErrorDetail::for_record(
                            *kind,
                            &record.id,
                            error.to_string(),
                        ));
                    }
                }
            }
        }

        // Persist newly detected conflicts.
        progress(options, SyncPhase::Resolving, 0, new_conflicts.len());
        for conflict in &new_conflicts {
            self.conflicts.record(conflict.clone()).await?;
        }

        Ok(SyncResult {
            uploaded,
            downloaded,
            conflicts: new_conflicts.len(),
            errors,
            duration_ms: 0,
            success: false,
        })
    }

    /// Translate one queued operation into the matching remote call and
    /// confirm the local record on success.
    async fn push_operation(&self, op: &PendingOperation) -> Result<()> {
        match op.kind {
            OperationKind::Create => {
                let record = if op.entity == EntityKind::ReviewEvent {
                    self.remote.mark_reviewed(&op.payload).await?
                } else {
                    self.remote.create(op.entity, &op.payload).await?
                };
                let server_id = (op.entity == EntityKind::Entry).then_some(record.id.as_str());
                self.store
                    .mark_record_synced(op.entity, &op.entity_id, server_id)
                    .await?;
            }
            OperationKind::Update => {
                let expected_version = (op.entity == EntityKind::Entry)
                    .then(|| op.payload.get("version").and_then(Value::as_i64))
                    .flatten();
                self.remote
                    .update(op.entity, &op.entity_id, &op.payload, expected_version)
                    .await?;
                self.store
                    .mark_record_synced(op.entity, &op.entity_id, None)
                    .await?;
            }
            OperationKind::Delete => {
                self.remote.delete(op.entity, &op.entity_id).await?;
                // Soft-deleted tombstones get confirmed; hard-deleted link
                // rows are already gone locally.
                self.store
                    .mark_record_synced(op.entity, &op.entity_id, None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_upload_conflict(
        &self,
        op: &PendingOperation,
        strategy: ConflictStrategy,
        uploaded: &mut usize,
        errors: &mut Vec<SyncErrorDetail>,
        new_conflicts: &mut Vec<SyncConflict>,
    ) -> Result<()> {
        match strategy {
            ConflictStrategy::Local => match self.force_push(op).await {
                Ok(()) => {
                    self.log.remove(&op.id).await?;
                    *uploaded += 1;
                }
                Err(error) => {
                    // A failing force-push is re-classified as a plain error.
                    let message = error.to_string();
                    self.log.mark_failed(&op.id, &message).await?;
                    errors.push(SyncErrorDetail::for_record(op.entity, &op.entity_id, message));
                }
            },
            ConflictStrategy::Remote => {
                // Remote wins: drop the local mutation and let the download
                // phase overwrite the record.
                self.log.remove(&op.id).await?;
            }
            ConflictStrategy::Manual => {
                // The remote snapshot is unknown at this point; record the
                // divergence with a placeholder and keep the op queued.
                if !self.conflicts.has_unresolved(op.entity, &op.entity_id).await {
                    let local_updated_at = op
                        .payload
                        .get("updated_at")
                        .and_then(Value::as_i64)
                        .unwrap_or(op.created_at);
                    new_conflicts.push(SyncConflict::new(
                        op.entity,
                        &op.entity_id,
                        op.payload.clone(),
                        Value::Null,
                        local_updated_at,
                        0,
                    ));
                }
                self.store.mark_record_conflict(op.entity, &op.entity_id).await?;
            }
        }
        Ok(())
    }

    /// Force-overwrite the remote copy with the local state.
    ///
    /// Entry version conflicts are not directly expressible as an update,
    /// so entries fall back to delete-then-recreate; the server may assign
    /// a fresh canonical ID, which is cascaded locally.
    async fn force_push(&self, op: &PendingOperation) -> Result<()> {
        if op.kind == OperationKind::Delete {
            match self.remote.delete(op.entity, &op.entity_id).await {
                Ok(()) | Err(RemoteError::NotFound(_)) => {}
                Err(error) => return Err(error.into()),
            }
            self.store
                .mark_record_synced(op.entity, &op.entity_id, None)
                .await?;
            return Ok(());
        }

        if op.entity == EntityKind::Entry {
            match self.remote.delete(op.entity, &op.entity_id).await {
                Ok(()) | Err(RemoteError::NotFound(_)) => {}
                Err(error) => return Err(error.into()),
            }
            let record = self.remote.create(op.entity, &op.payload).await?;
            self.store
                .mark_record_synced(op.entity, &op.entity_id, Some(&record.id))
                .await?;
        } else {
            self.remote
                .update(op.entity, &op.entity_id, &op.payload, None)
                .await?;
            self.store
                .mark_record_synced(op.entity, &op.entity_id, None)
                .await?;
        }
        Ok(())
    }

    async fn reconcile_record(
        &self,
        kind: EntityKind,
        id: &str,
        remote_updated_at: i64,
        payload: &Value,
        strategy: ConflictStrategy,
    ) -> Result<Reconciliation> {
        let Some(local) = self.store.record_snapshot(kind, id).await? else {
            self.store.apply_remote_record(kind, payload).await?;
            return Ok(Reconciliation::Applied);
        };

        match local.sync_status {
            // Server is authoritative once local has no outstanding edits.
            SyncStatus::Synced => {
                self.store.apply_remote_record(kind, payload).await?;
                Ok(Reconciliation::Applied)
            }
            SyncStatus::Pending | SyncStatus::Conflict => {
                self.reconcile_dirty_record(kind, id, remote_updated_at, payload, local, strategy)
                    .await
            }
        }
    }

    async fn reconcile_dirty_record(
        &self,
        kind: EntityKind,
        id: &str,
        remote_updated_at: i64,
        payload: &Value,
        local: LocalSnapshot,
        strategy: ConflictStrategy,
    ) -> Result<Reconciliation> {
        // Remote not newer: local wins silently; the upload phase will
        // eventually push local state.
        if remote_updated_at <= local.updated_at {
            return Ok(Reconciliation::LocalWins);
        }

        match strategy {
            ConflictStrategy::Remote => {
                self.store.apply_remote_record(kind, payload).await?;
                self.log.remove_for(kind, id).await?;
                Ok(Reconciliation::Applied)
            }
            // Local will win on the next upload.
            ConflictStrategy::Local => Ok(Reconciliation::LocalWins),
            ConflictStrategy::Manual => {
                if self.conflicts.has_unresolved(kind, id).await {
                    return Ok(Reconciliation::AlreadyConflicted);
                }
                Ok(Reconciliation::Conflicted(SyncConflict::new(
                    kind,
                    id,
                    local.payload,
                    payload.clone(),
                    local.updated_at,
                    remote_updated_at,
                )))
            }
        }
    }

    async fn run_bulk_upload(&self, user_id: &str) -> Result<SyncResult> {
        let mut uploaded = 0usize;
        let mut errors: Vec<SyncErrorDetail> = Vec::new();

        for kind in EntityKind::ALL {
            let pending = self.store.pending_payloads(kind, user_id).await?;
            for (id, payload) in pending {
                let result = if kind == EntityKind::ReviewEvent {
                    self.remote.mark_reviewed(&payload).await
                } else {
                    self.remote.create(kind, &payload).await
                };

                match result {
                    Ok(record) => {
                        let server_id = (kind == EntityKind::Entry).then_some(record.id.as_str());
                        self.store.mark_record_synced(kind, &id, server_id).await?;
                        self.log.remove_for(kind, &id).await?;
                        uploaded += 1;
                    }
                    Err(error) => {
                        errors.push(SyncErrorDetail::for_record(kind, &id, error.to_string()));
                    }
                }
            }
        }

        Ok(SyncResult {
            uploaded,
            downloaded: 0,
            conflicts: 0,
            errors,
            duration_ms: 0,
            success: false,
        })
    }
}

fn progress(options: &SyncOptions, phase: SyncPhase, current: usize, total: usize) {
    if let Some(callback) = &options.on_progress {
        callback(phase, current, total);
    }
}
