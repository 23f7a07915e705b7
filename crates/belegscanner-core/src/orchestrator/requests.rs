//! Selection request tracking.
//!
//! When the user clicks through messages faster than they load, every
//! click starts a fetch. Only the most recent one may update what is shown;
//! earlier results are stale and get discarded.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identifier of one selection request. Increases monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct State {
    last_issued: u64,
    current: Option<RequestId>,
}

/// Tracks which selection request is current.
#[derive(Debug, Default)]
pub(crate) struct RequestTracker {
    state: Mutex<State>,
}

impl RequestTracker {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a new request, making every earlier one stale.
    pub(crate) fn start(&self) -> RequestId {
        let mut state = self.lock();
        state.last_issued += 1;
        let id = RequestId(state.last_issued);
        state.current = Some(id);
        id
    }

    /// Returns true if `id` is the most recent, uncancelled request.
    pub(crate) fn is_current(&self, id: RequestId) -> bool {
        self.lock().current == Some(id)
    }

    /// Makes the pending request, if any, stale.
    pub(crate) fn cancel(&self) {
        self.lock().current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increment() {
        let tracker = RequestTracker::default();
        let a = tracker.start();
        let b = tracker.start();
        let c = tracker.start();
        assert_eq!(b.0, a.0 + 1);
        assert_eq!(c.0, b.0 + 1);
    }

    #[test]
    fn test_only_latest_is_current() {
        let tracker = RequestTracker::default();
        let a = tracker.start();
        let b = tracker.start();
        let c = tracker.start();

        assert!(!tracker.is_current(a));
        assert!(!tracker.is_current(b));
        assert!(tracker.is_current(c));
    }

    #[test]
    fn test_unknown_id_is_stale() {
        let tracker = RequestTracker::default();
        let _ = tracker.start();
        assert!(!tracker.is_current(RequestId(9999)));
    }

    #[test]
    fn test_cancel_then_new_request() {
        let tracker = RequestTracker::default();
        let old = tracker.start();
        tracker.cancel();
        assert!(!tracker.is_current(old));

        let new = tracker.start();
        assert!(tracker.is_current(new));
        assert!(new > old);
    }
}
