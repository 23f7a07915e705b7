//! Registry of prefetches that have not finished yet.
//!
//! Each registration hands back a guard. Dropping the guard, on success,
//! failure or panic alike, removes the entry and wakes everyone waiting on
//! that identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::model::MessageIdentity;

#[derive(Debug)]
struct Entry {
    token: u64,
    done: watch::Receiver<()>,
}

#[derive(Debug, Default)]
struct Registry {
    next_token: u64,
    entries: HashMap<MessageIdentity, Entry>,
}

/// In-flight prefetches keyed by identity.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlight {
    registry: Arc<Mutex<Registry>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a fetch for `identity` unless one is already running.
    pub(crate) fn begin(&self, identity: &MessageIdentity) -> Option<InFlightGuard> {
        let mut registry = self.lock();
        if registry.entries.contains_key(identity) {
            return None;
        }
        registry.next_token += 1;
        let token = registry.next_token;
        let (tx, rx) = watch::channel(());
        registry
            .entries
            .insert(identity.clone(), Entry { token, done: rx });
        Some(InFlightGuard {
            registry: Arc::clone(&self.registry),
            identity: identity.clone(),
            token,
            _done: tx,
        })
    }

    /// Returns true if a fetch for `identity` is running.
    pub(crate) fn contains(&self, identity: &MessageIdentity) -> bool {
        self.lock().entries.contains_key(identity)
    }

    /// Waits until the fetch for `identity` finishes. Returns immediately if
    /// none is running.
    pub(crate) async fn wait(&self, identity: &MessageIdentity) {
        let done = self.lock().entries.get(identity).map(|e| e.done.clone());
        if let Some(mut done) = done {
            // Nothing is ever sent; the sender dropping is the signal
            let _ = done.changed().await;
        }
    }

    /// Forgets every registration. Running fetches keep their guards.
    pub(crate) fn clear(&self) {
        self.lock().entries.clear();
    }
}

/// Marks one fetch as running until dropped.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    registry: Arc<Mutex<Registry>>,
    identity: MessageIdentity,
    token: u64,
    _done: watch::Sender<()>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        // Only remove our own registration; a newer one may have replaced it after a clear
        if registry
            .entries
            .get(&self.identity)
            .is_some_and(|e| e.token == self.token)
        {
            registry.entries.remove(&self.identity);
        }
    }
}
