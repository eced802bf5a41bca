//! Publish-subscribe channel for coarse sync lifecycle state.
//!
//! A bounded listener set notified synchronously when the state changes.
//! Listeners run outside the internal lock, so a listener may subscribe or
//! unsubscribe others without deadlocking.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::models::SyncState;

/// Maximum number of concurrent listeners.
const MAX_LISTENERS: usize = 32;

type Listener = Arc<dyn Fn(SyncState) + Send + Sync>;

/// Opaque handle returned by [`SyncStatePublisher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

/// Broadcasts `idle`/`syncing`/`error`/`conflict` transitions.
pub struct SyncStatePublisher {
    inner: Mutex<PublisherInner>,
}

struct PublisherInner {
    current: SyncState,
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl SyncStatePublisher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PublisherInner {
                current: SyncState::Idle,
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn current(&self) -> SyncState {
        self.inner.lock().map_or(SyncState::Error, |inner| inner.current)
    }

    /// Register a listener; it fires on every state change until
    /// unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(SyncState) + Send + Sync + 'static) -> Result<SubscriberId> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::Database("sync state publisher poisoned".into()))?;

        if inner.listeners.len() >= MAX_LISTENERS {
            return Err(Error::InvalidInput(format!(
                "listener capacity ({MAX_LISTENERS}) exhausted"
            )));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Ok(SubscriberId(id))
    }

    /// Remove a listener. Returns `false` when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id.0);
        inner.listeners.len() < before
    }

    /// Transition to a new state, notifying listeners when it changed.
    pub fn set(&self, state: SyncState) {
        let listeners: Vec<Listener> = {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            if inner.current == state {
                return;
            }
            inner.current = state;
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in listeners {
            listener(state);
        }
    }
}

impl Default for SyncStatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn notifies_listeners_on_change_only() {
        let publisher = SyncStatePublisher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        publisher
            .subscribe(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        publisher.set(SyncState::Syncing);
        publisher.set(SyncState::Syncing); // no change, no notification
        publisher.set(SyncState::Idle);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(publisher.current(), SyncState::Idle);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let publisher = SyncStatePublisher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        let id = publisher
            .subscribe(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        publisher.set(SyncState::Syncing);
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.set(SyncState::Idle);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_capacity_is_bounded() {
        let publisher = SyncStatePublisher::new();
        for _ in 0..MAX_LISTENERS {
            publisher.subscribe(|_| {}).unwrap();
        }
        assert!(publisher.subscribe(|_| {}).is_err());
    }
}
