//! Guarded holder for one live connection.
//!
//! A [`ConnectionSlot`] replaces a bare "current connection" field. Readers
//! never borrow the slot's contents: [`ConnectionSlot::capture`] hands out
//! an owned `Arc` snapshot, and a background task works with that snapshot
//! for its whole lifetime. Clearing or replacing the slot only unregisters
//! the handle; the captured `Arc` stays a valid object until the last task
//! holding it lets go.
//!
//! ```text
//! EMPTY ── set ──→ ACTIVE ── clear / clear_if ──→ EMPTY
//!                    │  ▲
//!                    └──┘ set (old handle closed)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::model::Role;
use crate::protocol::MailConnection;

/// Holds zero or one live connection for a role.
pub struct ConnectionSlot<C> {
    role: Role,
    current: Mutex<Option<Arc<C>>>,
}

impl<C: MailConnection> ConnectionSlot<C> {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self {
            role,
            current: Mutex::new(None),
        }
    }

    /// The role this slot serves.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<C>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a handle, closing the one it replaces.
    pub async fn set(&self, connection: C) {
        let previous = self.lock().replace(Arc::new(connection));
        debug!(role = %self.role, replaced = previous.is_some(), "Connection installed");
        if let Some(previous) = previous {
            previous.close().await;
        }
    }

    /// Removes and closes the current handle, if any.
    ///
    /// Captures taken after this call observe an empty slot. Captures taken
    /// before keep their snapshot.
    pub async fn clear(&self) {
        let previous = self.lock().take();
        if let Some(previous) = previous {
            debug!(role = %self.role, "Connection cleared");
            previous.close().await;
        }
    }

    /// Removes `connection` if it is still the installed handle.
    ///
    /// Returns false, leaving the slot alone, when the slot is empty or holds
    /// a newer handle. Closing `connection` is left to the caller.
    pub fn clear_if(&self, connection: &Arc<C>) -> bool {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, connection)) {
            *current = None;
            debug!(role = %self.role, "Dead connection removed");
            true
        } else {
            false
        }
    }

    /// Returns a snapshot of the current handle without removing it.
    #[must_use]
    pub fn capture(&self) -> Option<Arc<C>> {
        self.lock().clone()
    }

    /// Returns true if a handle is installed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }
}

impl<C> std::fmt::Debug for ConnectionSlot<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self
            .current
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().is_some(), |guard| guard.is_some());
        f.debug_struct("ConnectionSlot")
            .field("role", &self.role)
            .field("active", &active)
            .finish()
    }
}
