//! Bounded recency cache of fetched messages.
//!
//! Entries are keyed by [`MessageIdentity`] and evicted strictly
//! least-recently-used. A single mutex covers every read-modify-write
//! sequence, so the cache can be touched from the interactive flow and from
//! background completion handlers alike.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::model::{MessageContent, MessageIdentity};
use crate::{Error, Result};

/// Default number of messages kept in memory.
pub const DEFAULT_CAPACITY: usize = 20;

/// LRU cache of fetched message content.
pub struct RecencyCache {
    entries: Mutex<LruCache<MessageIdentity, Arc<MessageContent>>>,
}

impl RecencyCache {
    /// Creates a cache holding at most `capacity` messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::Config("cache capacity must be greater than zero".to_string()))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<MessageIdentity, Arc<MessageContent>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a message, marking it most recently used on a hit.
    #[must_use]
    pub fn lookup(&self, identity: &MessageIdentity) -> Option<Arc<MessageContent>> {
        self.lock().get(identity).cloned()
    }

    /// Stores a message, evicting the least recently used entry when full.
    ///
    /// Re-inserting an identity replaces its content and refreshes its rank.
    pub fn insert(&self, identity: MessageIdentity, content: Arc<MessageContent>) {
        let mut entries = self.lock();
        if let Some((evicted, _)) = entries.push(identity.clone(), content)
            && evicted != identity
        {
            debug!(%evicted, "Evicted least recently used message");
        }
    }

    /// Removes a message. Absent identities are ignored.
    pub fn invalidate(&self, identity: &MessageIdentity) {
        if self.lock().pop(identity).is_some() {
            debug!(%identity, "Invalidated cached message");
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut entries = self.lock();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "Cleared message cache");
    }

    /// Returns true if the message is cached, without touching its rank.
    #[must_use]
    pub fn contains(&self, identity: &MessageIdentity) -> bool {
        self.lock().contains(identity)
    }

    /// Number of cached messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of cached messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// Cached identities, most recently used first.
    #[must_use]
    pub fn identities(&self) -> Vec<MessageIdentity> {
        self.lock().iter().map(|(id, _)| id.clone()).collect()
    }
}

impl Default for RecencyCache {
    fn default() -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }
}

impl std::fmt::Debug for RecencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecencyCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
