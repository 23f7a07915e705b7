//! Sequencing of cache, prefetch and move operations.
//!
//! The orchestrator is the only place that decides between a cache hit, a
//! primary fetch, and a background prefetch. Processing a message follows a
//! fixed order:
//!
//! 1. The caller resolves the *next* identity from the list already on
//!    screen, before anything is mutated.
//! 2. A prefetch of that identity is spawned on the prefetch session.
//! 3. The archive artifact is built and the current message is moved on the
//!    primary session. Step 2 is not awaited first; the two run on disjoint
//!    sessions.
//! 4. On a confirmed move the current identity is invalidated, and only then
//!    is the move reported as done.
//!
//! Results of background work produced under an earlier session (before a
//! disconnect or primary reconnect) are dropped rather than cached, and so
//! are results for a message that has been moved away in the meantime.

mod in_flight;
mod requests;

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::cache::RecencyCache;
use crate::client::DualConnectionClient;
use crate::config::PrefetchConfig;
use crate::events::{EventReceiver, EventSender, MailEvent};
use crate::model::{Credentials, MessageContent, MessageIdentity, MessageSummary, Role};
use crate::protocol::MailConnector;
use crate::{Error, Result};

use in_flight::InFlight;
pub use requests::RequestId;
use requests::RequestTracker;

/// Coordinates the cache with the dual-connection client.
///
/// Cheap to clone; clones share all state.
pub struct PrefetchOrchestrator<K: MailConnector> {
    shared: Arc<Shared<K>>,
}

impl<K: MailConnector> Clone for PrefetchOrchestrator<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<K: MailConnector> {
    client: DualConnectionClient<K>,
    cache: RecencyCache,
    /// Guards every insert of fetch results.
    session: Mutex<SessionState>,
    in_flight: InFlight,
    requests: RequestTracker,
    config: PrefetchConfig,
    events: EventSender,
}

#[derive(Debug, Default)]
struct SessionState {
    generation: u64,
    /// Identities moved away during this generation. Never cached again.
    moved: HashSet<MessageIdentity>,
}

impl<K: MailConnector> Shared<K> {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_session(&self) -> u64 {
        self.session().generation
    }

    /// Starts a new session: bumps the generation and drops all cached state.
    fn reset_session(&self) {
        let mut session = self.session();
        session.generation += 1;
        session.moved.clear();
        self.cache.clear();
        self.in_flight.clear();
        debug!(session = session.generation, "Session reset");
    }

    /// Records a confirmed move and drops the cached copy.
    ///
    /// Runs under the same lock as [`insert_if_current`](Self::insert_if_current),
    /// so a fetch still running for `identity` can no longer cache it.
    fn mark_moved(&self, identity: &MessageIdentity) {
        let mut session = self.session();
        session.moved.insert(identity.clone());
        self.cache.invalidate(identity);
    }

    fn is_moved(&self, identity: &MessageIdentity) -> bool {
        self.session().moved.contains(identity)
    }

    /// Caches `content` only if no reset happened since `session` was read
    /// and the message has not been moved since.
    fn insert_if_current(
        &self,
        session: u64,
        identity: &MessageIdentity,
        content: &Arc<MessageContent>,
    ) -> bool {
        let current = self.session();
        if current.generation != session || current.moved.contains(identity) {
            return false;
        }
        self.cache.insert(identity.clone(), Arc::clone(content));
        true
    }

    /// Cache-checked fetch on the primary session.
    async fn select(
        &self,
        identity: &MessageIdentity,
        request: Option<RequestId>,
    ) -> Result<Arc<MessageContent>> {
        if let Some(hit) = self.cache.lookup(identity) {
            debug!(%identity, "Cache hit");
            return Ok(hit);
        }

        if self.in_flight.contains(identity) {
            debug!(%identity, "Waiting for running prefetch");
            if tokio::time::timeout(self.config.prefetch_wait, self.in_flight.wait(identity))
                .await
                .is_err()
            {
                debug!(%identity, "Prefetch wait timed out");
            }
            if let Some(hit) = self.cache.lookup(identity) {
                debug!(%identity, "Cache hit after prefetch");
                return Ok(hit);
            }
        }

        let session = self.current_session();
        let content = Arc::new(self.client.fetch_message(identity).await?);

        let wanted = request.is_none_or(|id| self.requests.is_current(id));
        if wanted && !self.insert_if_current(session, identity, &content) {
            debug!(%identity, "Session changed or message moved during fetch, not caching");
        }
        Ok(content)
    }

    async fn prefetch(&self, identity: MessageIdentity, session: u64) {
        match self.client.fetch_message_prefetch(&identity).await {
            Ok(content) => {
                let content = Arc::new(content);
                if self.insert_if_current(session, &identity, &content) {
                    debug!(%identity, "Prefetched");
                    self.events.send(MailEvent::PrefetchCompleted { identity });
                } else {
                    warn!(%identity, "Discarding stale prefetch result");
                }
            }
            // Prefetch is an optimisation; failure only means a later cache miss
            Err(e) => warn!(%identity, "Prefetch failed: {e}"),
        }
    }
}

impl<K: MailConnector> PrefetchOrchestrator<K> {
    /// Creates an orchestrator and the receiving end of its notifications.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the cache capacity is zero.
    pub fn new(connector: K, config: PrefetchConfig) -> Result<(Self, EventReceiver)> {
        let cache = RecencyCache::new(config.cache_capacity)?;
        let (events, receiver) = EventSender::channel();
        let shared = Shared {
            client: DualConnectionClient::new(connector),
            cache,
            session: Mutex::new(SessionState::default()),
            in_flight: InFlight::default(),
            requests: RequestTracker::default(),
            config,
            events,
        };
        Ok((
            Self {
                shared: Arc::new(shared),
            },
            receiver,
        ))
    }

    /// The message cache.
    #[must_use]
    pub fn cache(&self) -> &RecencyCache {
        &self.shared.cache
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &DualConnectionClient<K> {
        &self.shared.client
    }

    /// Returns true if the slot for `role` holds a session.
    #[must_use]
    pub fn is_connected(&self, role: Role) -> bool {
        self.shared.client.is_connected(role)
    }

    /// Opens the primary session and starts a fresh cache.
    ///
    /// # Errors
    ///
    /// Returns the connect failure; existing state is left untouched.
    pub async fn connect_primary(&self, credentials: &Credentials) -> Result<()> {
        self.shared.client.connect_primary(credentials).await?;
        self.shared.reset_session();
        Ok(())
    }

    /// Opens the prefetch session.
    ///
    /// # Errors
    ///
    /// Returns the connect failure; existing state is left untouched.
    pub async fn connect_prefetch(&self, credentials: &Credentials) -> Result<()> {
        self.shared.client.connect_prefetch(credentials).await
    }

    /// Closes both sessions, clears the cache and invalidates pending
    /// selections. Idempotent.
    pub async fn disconnect(&self) {
        self.shared.requests.cancel();
        self.shared.client.disconnect().await;
        self.shared.reset_session();
        info!("Disconnected");
    }

    /// Lists a folder on the primary session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] or the protocol failure.
    pub async fn list_summaries(&self, folder: &str) -> Result<Vec<MessageSummary>> {
        self.shared.client.list_summaries(folder).await
    }

    /// Returns a message, from the cache if possible.
    ///
    /// A hit performs no I/O. If a prefetch of the same message is running
    /// the call waits for it (up to the configured timeout) before falling
    /// back to a fetch on the primary session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] or the protocol failure of the
    /// fallback fetch.
    pub async fn select_message(&self, identity: &MessageIdentity) -> Result<Arc<MessageContent>> {
        self.shared.select(identity, None).await
    }

    /// Starts a tracked selection in the background.
    ///
    /// The outcome is delivered as [`MailEvent::FetchCompleted`] if this is
    /// still the most recent request when it finishes; otherwise it is
    /// discarded without being cached. Must be called within a tokio runtime.
    #[must_use = "the id identifies the FetchCompleted event for this request"]
    pub fn request_selection(&self, identity: MessageIdentity) -> RequestId {
        let request = self.shared.requests.start();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = shared.select(&identity, Some(request)).await;
            if shared.requests.is_current(request) {
                shared.events.send(MailEvent::FetchCompleted {
                    request,
                    identity,
                    result,
                });
            } else {
                debug!(%identity, %request, "Discarding stale selection result");
            }
        });
        request
    }

    /// Makes any pending tracked selection stale.
    pub fn cancel_selection(&self) {
        self.shared.requests.cancel();
    }

    /// Starts a background prefetch on the prefetch session.
    ///
    /// Returns false without doing anything if the message is already cached,
    /// already being prefetched, or has been moved away. Failures are logged
    /// and otherwise silent. Must be called within a tokio runtime.
    pub fn prefetch(&self, identity: MessageIdentity) -> bool {
        if self.shared.cache.contains(&identity) || self.shared.is_moved(&identity) {
            return false;
        }
        let Some(guard) = self.shared.in_flight.begin(&identity) else {
            return false;
        };
        let session = self.shared.current_session();
        let shared = Arc::clone(&self.shared);
        debug!(%identity, "Starting prefetch");
        tokio::spawn(async move {
            // Released after the result is cached, waking waiting selections
            let _guard = guard;
            shared.prefetch(identity, session).await;
        });
        true
    }

    /// Archives `current` after running an artifact step, prefetching `next`
    /// in the meantime.
    ///
    /// `build_artifact` produces whatever must exist before the message
    /// leaves the inbox (a filed PDF, for instance). If it fails, nothing is
    /// moved or invalidated. The message is moved from its own mailbox to
    /// `archive_folder`; its cache entry is invalidated before this returns.
    /// The outcome is also delivered as [`MailEvent::MoveCompleted`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Artifact`] from the artifact step, or
    /// [`Error::NotConnected`], [`Error::Protocol`] or
    /// [`Error::ConnectionLost`] from the move. Prefetch failures are never
    /// reported here.
    pub async fn process_and_advance<F, Fut>(
        &self,
        current: &MessageIdentity,
        next: Option<&MessageIdentity>,
        archive_folder: &str,
        build_artifact: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if let Some(next) = next {
            self.prefetch(next.clone());
        }

        let result = self.archive(current, archive_folder, build_artifact).await;
        self.shared.events.send(MailEvent::MoveCompleted {
            identity: current.clone(),
            result: result.clone(),
        });
        result
    }

    /// Archives `current` without an artifact step, prefetching `next`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] or [`Error::Protocol`] from the move.
    pub async fn archive_and_advance(
        &self,
        current: &MessageIdentity,
        next: Option<&MessageIdentity>,
        archive_folder: &str,
    ) -> Result<()> {
        self.process_and_advance(current, next, archive_folder, || async { Ok(()) })
            .await
    }

    async fn archive<F, Fut>(
        &self,
        current: &MessageIdentity,
        archive_folder: &str,
        build_artifact: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        build_artifact().await.map_err(|e| match e {
            Error::Artifact(_) => e,
            other => Error::Artifact(other.to_string()),
        })?;

        self.shared
            .client
            .move_message(current, &current.mailbox, archive_folder)
            .await?;

        // Must precede reporting the move as done
        self.shared.mark_moved(current);
        Ok(())
    }
}

impl<K: MailConnector> std::fmt::Debug for PrefetchOrchestrator<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchOrchestrator")
            .field("client", &self.shared.client)
            .field("cache", &self.shared.cache)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
