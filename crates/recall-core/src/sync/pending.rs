//! Durable pending-operation log.
//!
//! A deduplicating queue of not-yet-confirmed mutations, keyed by
//! `(entity, entity_id)` and persisted as a JSON file independent of the
//! relational store so it survives process restarts. Writes are
//! read-modify-write over the full collection; the log is bounded by the
//! number of dirty records, not by edit frequency.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{EntityKind, OperationKind, PendingOperation};

/// Shared handle to the pending-operation log.
#[derive(Clone)]
pub struct PendingOperationLog {
    inner: Arc<Mutex<LogInner>>,
}

struct LogInner {
    path: Option<PathBuf>,
    operations: Vec<PendingOperation>,
}

impl LogInner {
    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_vec_pretty(&self.operations)?)?;
        }
        Ok(())
    }
}

impl PendingOperationLog {
    /// Open (or create) a log persisted at the given path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let operations = if path.exists() {
            let raw = std::fs::read(&path)?;
            serde_json::from_slice(&raw)?
        } else {
            Vec::new()
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(LogInner {
                path: Some(path),
                operations,
            })),
        })
    }

    /// In-memory log (primarily for tests).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                path: None,
                operations: Vec::new(),
            })),
        }
    }

    /// Enqueue a mutation, coalescing with any queued one for the same key.
    ///
    /// Merge rules (existing → incoming):
    /// - create → update: stays a create carrying the latest snapshot
    /// - create → delete: the operation is dropped entirely
    /// - update → delete: becomes a delete
    /// - same kind: replaced by the incoming operation
    ///
    /// Returns the resulting queued operation, or `None` when the pair
    /// annihilated (create followed by delete).
    pub async fn add(
        &self,
        entity: EntityKind,
        entity_id: &str,
        kind: OperationKind,
        payload: Value,
    ) -> Result<Option<PendingOperation>> {
        let mut inner = self.inner.lock().await;

        let existing = inner
            .operations
            .iter()
            .position(|op| op.entity == entity && op.entity_id == entity_id);

        let result = match existing {
            None => {
                let op = PendingOperation::new(entity, entity_id, kind, payload);
                inner.operations.push(op.clone());
                Some(op)
            }
            Some(index) => {
                let merged_kind = match (inner.operations[index].kind, kind) {
                    (OperationKind::Create, OperationKind::Delete) => {
                        // Never reached the server, so there is nothing to
                        // delete remotely.
                        inner.operations.remove(index);
                        inner.persist()?;
                        return Ok(None);
                    }
                    (OperationKind::Create, OperationKind::Update) => OperationKind::Create,
                    (OperationKind::Update, OperationKind::Delete) => OperationKind::Delete,
                    (_, incoming) => incoming,
                };

                let op = &mut inner.operations[index];
                op.kind = merged_kind;
                op.payload = payload;
                op.retry_count = 0;
                op.last_error = None;
                Some(op.clone())
            }
        };

        inner.persist()?;
        Ok(result)
    }

    /// All queued operations in FIFO order.
    pub async fn get_all(&self) -> Vec<PendingOperation> {
        let inner = self.inner.lock().await;
        let mut operations = inner.operations.clone();
        operations.sort_by_key(|op| op.created_at);
        operations
    }

    /// Remove a confirmed operation.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.operations.len();
        inner.operations.retain(|op| op.id != id);
        let removed = inner.operations.len() < before;
        if removed {
            inner.persist()?;
        }
        Ok(removed)
    }

    /// Remove whatever operation is queued for a record, if any.
    pub async fn remove_for(&self, entity: EntityKind, entity_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.operations.len();
        inner
            .operations
            .retain(|op| !(op.entity == entity && op.entity_id == entity_id));
        let removed = inner.operations.len() < before;
        if removed {
            inner.persist()?;
        }
        Ok(removed)
    }

    /// Record a failed upload attempt without dropping the operation.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(op) = inner.operations.iter_mut().find(|op| op.id == id) else {
            return Ok(false);
        };
        op.retry_count += 1;
        op.last_error = Some(error.to_string());
        inner.persist()?;
        Ok(true)
    }

    /// Operations that exceeded the retry budget.
    ///
    /// The log never drops these on its own; surfacing them is how a human
    /// or a higher-level policy decides disposal.
    pub async fn failed_operations(&self, max_retries: u32) -> Vec<PendingOperation> {
        let inner = self.inner.lock().await;
        inner
            .operations
            .iter()
            .filter(|op| op.retry_count > max_retries)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.operations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.operations.is_empty()
    }
}
