//! Closable holder for a session that serializes commands.
//!
//! Closing never waits for a running command. Whichever side comes second,
//! the closer or the command releasing its guard, gets the session back and
//! is responsible for logging it out.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard};

use belegscanner_core::{Error, Result};

pub struct SessionCell<S> {
    closed: AtomicBool,
    session: Mutex<Option<S>>,
}

impl<S> SessionCell<S> {
    pub fn new(session: S) -> Self {
        Self {
            closed: AtomicBool::new(false),
            session: Mutex::new(Some(session)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits for exclusive use of the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] once the cell has been closed.
    pub async fn lock(&self) -> Result<MutexGuard<'_, Option<S>>> {
        if self.is_closed() {
            return Err(Error::ConnectionLost("connection closed".into()));
        }
        let guard = self.session.lock().await;
        if guard.is_none() {
            return Err(Error::ConnectionLost("connection closed".into()));
        }
        Ok(guard)
    }

    /// Gives the guard back. Returns the session if the cell was closed while
    /// the guard was held.
    pub fn release(&self, guard: MutexGuard<'_, Option<S>>) -> Option<S> {
        // The guard must be gone before the flag is read, or a close that
        // failed to take the lock could go unnoticed
        drop(guard);
        if self.is_closed() {
            self.take_idle()
        } else {
            None
        }
    }

    /// Marks the cell closed. Returns the session if no command holds it;
    /// otherwise the command's [`release`](Self::release) returns it.
    pub fn close(&self) -> Option<S> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.take_idle()
    }

    fn take_idle(&self) -> Option<S> {
        self.session.try_lock().ok().and_then(|mut guard| guard.take())
    }
}
