//! Durable store of unresolved sync conflicts.
//!
//! Each conflict carries both snapshots and both timestamps until a
//! resolution strategy is applied. Persisted as a JSON file next to the
//! pending-operation log.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{ConflictStrategy, EntityKind, SyncConflict};
use crate::util::now_ms;

/// Shared handle to the conflict store.
#[derive(Clone)]
pub struct ConflictStore {
    inner: Arc<Mutex<StoreInner>>,
}

struct StoreInner {
    path: Option<PathBuf>,
    conflicts: Vec<SyncConflict>,
}

impl StoreInner {
    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_vec_pretty(&self.conflicts)?)?;
        }
        Ok(())
    }
}

impl ConflictStore {
    /// Open (or create) a store persisted at the given path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conflicts = if path.exists() {
            let raw = std::fs::read(&path)?;
            serde_json::from_slice(&raw)?
        } else {
            Vec::new()
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner {
                path: Some(path),
                conflicts,
            })),
        })
    }

    /// In-memory store (primarily for tests).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                path: None,
                conflicts: Vec::new(),
            })),
        }
    }

    /// Persist a newly detected conflict.
    pub async fn record(&self, conflict: SyncConflict) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.conflicts.push(conflict);
        inner.persist()
    }

    /// All conflicts, newest first.
    pub async fn all(&self) -> Vec<SyncConflict> {
        let inner = self.inner.lock().await;
        let mut conflicts = inner.conflicts.clone();
        conflicts.sort_by_key(|c| std::cmp::Reverse(c.created_at));
        conflicts
    }

    /// Conflicts still awaiting a resolution.
    pub async fn unresolved(&self) -> Vec<SyncConflict> {
        self.all()
            .await
            .into_iter()
            .filter(|c| !c.is_resolved())
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<SyncConflict> {
        let inner = self.inner.lock().await;
        inner.conflicts.iter().find(|c| c.id == id).cloned()
    }

    /// Whether an unresolved conflict already exists for a record.
    pub async fn has_unresolved(&self, entity: EntityKind, entity_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .conflicts
            .iter()
            .any(|c| c.entity == entity && c.entity_id == entity_id && !c.is_resolved())
    }

    /// Stamp a conflict as resolved.
    ///
    /// Resolving twice is an error; re-applying a strategy after the fact
    /// could resurrect state the first resolution already settled.
    pub async fn resolve(&self, id: &str, strategy: ConflictStrategy) -> Result<SyncConflict> {
        let mut inner = self.inner.lock().await;
        let Some(conflict) = inner.conflicts.iter_mut().find(|c| c.id == id) else {
            return Err(Error::NotFound(id.to_string()));
        };
        if conflict.is_resolved() {
            return Err(Error::ConflictResolved(id.to_string()));
        }

        conflict.resolved_at = Some(now_ms());
        conflict.resolution = Some(strategy);
        let resolved = conflict.clone();
        inner.persist()?;
        Ok(resolved)
    }

    pub async fn count_unresolved(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.conflicts.iter().filter(|c| !c.is_resolved()).count()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn sample_conflict(entity_id: &str) -> SyncConflict {
        SyncConflict::new(
            EntityKind::Entry,
            entity_id,
            json!({"title": "local"}),
            json!({"title": "remote"}),
            100,
            200,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_and_resolve() {
        let store = ConflictStore::in_memory();
        let conflict = sample_conflict("e1");
        store.record(conflict.clone()).await.unwrap();

        assert_eq!(store.count_unresolved().await, 1);
        assert!(store.has_unresolved(EntityKind::Entry, "e1").await);

        let resolved = store
            .resolve(&conflict.id, ConflictStrategy::Remote)
            .await
            .unwrap();
        assert!(resolved.is_resolved());
        assert_eq!(resolved.resolution, Some(ConflictStrategy::Remote));
        assert_eq!(store.count_unresolved().await, 0);
        assert!(!store.has_unresolved(EntityKind::Entry, "e1").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolving_twice_is_an_error() {
        let store = ConflictStore::in_memory();
        let conflict = sample_conflict("e1");
        store.record(conflict.clone()).await.unwrap();

        store
            .resolve(&conflict.id, ConflictStrategy::Local)
            .await
            .unwrap();
        let error = store
            .resolve(&conflict.id, ConflictStrategy::Remote)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::ConflictResolved(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolving_missing_conflict_is_not_found() {
        let store = ConflictStore::in_memory();
        let error = store
            .resolve("missing", ConflictStrategy::Manual)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_conflicts.json");

        let first = sample_conflict("e1");
        {
            let store = ConflictStore::open(&path).unwrap();
            store.record(first.clone()).await.unwrap();
        }

        let reopened = ConflictStore::open(&path).unwrap();
        let all = reopened.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
        assert!(!all[0].is_resolved());
    }
}
