//! Scripted in-memory mail server for integration tests.
//!
//! Every connection gets a sequential id (the first connect is 1) and its own
//! call counters, so tests can assert which session did the I/O. Fetches on
//! a connection can be held at a gate to keep them in flight, either before
//! or after the message has been read.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{Notify, Semaphore};

use belegscanner_core::{
    Credentials, Error, EventReceiver, MailConnection, MailConnector, MailEvent, MessageContent,
    MessageIdentity, MessageSummary, Result,
};

pub const INBOX: &str = "Rechnungseingang";
pub const ARCHIVE: &str = "Rechnungseingang/archiviert";

/// Call counters of one connection.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub id: usize,
    pub lists: AtomicUsize,
    pub fetches: AtomicUsize,
    pub moves: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub closed: AtomicBool,
}

impl ConnectionStats {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn moves(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.lists() + self.fetches() + self.moves()
    }
}

/// Shared server state.
#[derive(Debug, Default)]
pub struct Server {
    mailboxes: Mutex<HashMap<String, BTreeMap<u32, MessageContent>>>,
    next_uid: AtomicU32,
    connections: Mutex<Vec<Arc<ConnectionStats>>>,
    connect_attempts: AtomicUsize,
    fail_connect: AtomicBool,
    fail_move: AtomicBool,
    failing_fetch_connections: Mutex<HashSet<usize>>,
    gates: Mutex<HashMap<usize, Arc<Semaphore>>>,
    late_gates: Mutex<HashMap<usize, Arc<Semaphore>>>,
    lost_connections: Mutex<HashSet<usize>>,
    finished_fetches: AtomicUsize,
    /// Signalled whenever a fetch reaches a gate.
    pub fetch_held: Notify,
}

impl Server {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_uid: AtomicU32::new(1),
            ..Self::default()
        })
    }

    /// Adds a message to `mailbox` and returns its identity.
    pub fn deliver(&self, mailbox: &str, sender: &str, subject: &str) -> MessageIdentity {
        let uid = self.next_uid.fetch_add(1, Ordering::SeqCst);
        let identity = MessageIdentity::new(mailbox, uid);
        let content = MessageContent {
            identity: identity.clone(),
            sender: sender.to_string(),
            subject: subject.to_string(),
            date: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .unwrap()
                + chrono::Duration::hours(i64::from(uid)),
            message_id: format!("<{uid}@example.com>"),
            body_text: format!("Body of {subject}"),
            body_html: None,
            attachments: Vec::new(),
        };
        self.mailboxes
            .lock()
            .unwrap()
            .entry(mailbox.to_string())
            .or_default()
            .insert(uid, content);
        identity
    }

    pub fn mailbox_uids(&self, mailbox: &str) -> Vec<u32> {
        self.mailboxes
            .lock()
            .unwrap()
            .get(mailbox)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Connection by id (1-based, in connect order).
    pub fn connection(&self, id: usize) -> Arc<ConnectionStats> {
        Arc::clone(&self.connections.lock().unwrap()[id - 1])
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn total_fetches(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.fetches())
            .sum()
    }

    pub fn total_calls(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.calls())
            .sum()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_move(&self, fail: bool) {
        self.fail_move.store(fail, Ordering::SeqCst);
    }

    /// Makes every fetch on connection `id` fail.
    pub fn fail_fetches_on(&self, id: usize) {
        self.failing_fetch_connections.lock().unwrap().insert(id);
    }

    /// Holds fetches on connection `id` until released.
    pub fn hold_fetches_on(&self, id: usize) {
        self.gates
            .lock()
            .unwrap()
            .insert(id, Arc::new(Semaphore::new(0)));
    }

    /// Lets `count` held fetches on connection `id` proceed.
    pub fn release_fetches_on(&self, id: usize, count: usize) {
        if let Some(gate) = self.gates.lock().unwrap().get(&id) {
            gate.add_permits(count);
        }
    }

    /// Holds fetches on connection `id` after the message has been read,
    /// so the result is already taken when the move happens.
    pub fn hold_after_read_on(&self, id: usize) {
        self.late_gates
            .lock()
            .unwrap()
            .insert(id, Arc::new(Semaphore::new(0)));
    }

    pub fn release_after_read_on(&self, id: usize, count: usize) {
        if let Some(gate) = self.late_gates.lock().unwrap().get(&id) {
            gate.add_permits(count);
        }
    }

    /// Drops the transport of connection `id`; every later call on it fails
    /// with [`Error::ConnectionLost`].
    pub fn lose_connection(&self, id: usize) {
        self.lost_connections.lock().unwrap().insert(id);
    }

    /// Fetches that have returned, successfully or not.
    pub fn finished_fetches(&self) -> usize {
        self.finished_fetches.load(Ordering::SeqCst)
    }

    /// Yields until at least `count` fetches have returned.
    pub async fn wait_finished_fetches(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.finished_fetches() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("timed out waiting for fetches");
    }

    fn gate(&self, id: usize) -> Option<Arc<Semaphore>> {
        self.gates.lock().unwrap().get(&id).cloned()
    }

    fn late_gate(&self, id: usize) -> Option<Arc<Semaphore>> {
        self.late_gates.lock().unwrap().get(&id).cloned()
    }
}

/// Connector handing out [`ScriptedConnection`]s against one [`Server`].
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    pub server: Arc<Server>,
}

impl ScriptedConnector {
    pub fn new(server: &Arc<Server>) -> Self {
        Self {
            server: Arc::clone(server),
        }
    }
}

#[async_trait]
impl MailConnector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(&self, _credentials: &Credentials) -> Result<ScriptedConnection> {
        self.server.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.server.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Protocol("authentication failed".into()));
        }
        let mut connections = self.server.connections.lock().unwrap();
        let stats = Arc::new(ConnectionStats {
            id: connections.len() + 1,
            ..ConnectionStats::default()
        });
        connections.push(Arc::clone(&stats));
        Ok(ScriptedConnection {
            server: Arc::clone(&self.server),
            stats,
        })
    }
}

/// One session against the scripted server.
#[derive(Debug)]
pub struct ScriptedConnection {
    server: Arc<Server>,
    stats: Arc<ConnectionStats>,
}

impl ScriptedConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.stats.is_closed() {
            return Err(Error::ConnectionLost("connection closed".into()));
        }
        if self
            .server
            .lost_connections
            .lock()
            .unwrap()
            .contains(&self.stats.id)
        {
            return Err(Error::ConnectionLost("connection reset by peer".into()));
        }
        Ok(())
    }

    async fn fetch(&self, identity: &MessageIdentity) -> Result<MessageContent> {
        self.ensure_open()?;
        self.stats.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = self.server.gate(self.stats.id) {
            self.server.fetch_held.notify_one();
            gate.acquire().await.unwrap().forget();
            // A disconnect while held closes the session under us
            self.ensure_open()?;
        }

        if self
            .server
            .failing_fetch_connections
            .lock()
            .unwrap()
            .contains(&self.stats.id)
        {
            return Err(Error::Protocol("fetch failed".into()));
        }

        let content = self
            .server
            .mailboxes
            .lock()
            .unwrap()
            .get(&identity.mailbox)
            .and_then(|m| m.get(&identity.uid))
            .cloned()
            .ok_or_else(|| Error::Protocol(format!("no such message: {identity}")))?;

        if let Some(gate) = self.server.late_gate(self.stats.id) {
            self.server.fetch_held.notify_one();
            gate.acquire().await.unwrap().forget();
        }
        Ok(content)
    }
}

#[async_trait]
impl MailConnection for ScriptedConnection {
    async fn list_summaries(&self, folder: &str) -> Result<Vec<MessageSummary>> {
        self.ensure_open()?;
        self.stats.lists.fetch_add(1, Ordering::SeqCst);
        let mailboxes = self.server.mailboxes.lock().unwrap();
        Ok(mailboxes
            .get(folder)
            .map(|messages| {
                messages
                    .values()
                    .map(|m| MessageSummary {
                        identity: m.identity.clone(),
                        sender: m.sender.clone(),
                        subject: m.subject.clone(),
                        date: m.date,
                        has_attachments: !m.attachments.is_empty(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_message(&self, identity: &MessageIdentity) -> Result<MessageContent> {
        let result = self.fetch(identity).await;
        self.server.finished_fetches.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn move_message(
        &self,
        identity: &MessageIdentity,
        from_folder: &str,
        to_folder: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        self.stats.moves.fetch_add(1, Ordering::SeqCst);
        if self.server.fail_move.load(Ordering::SeqCst) {
            return Err(Error::Protocol("COPY failed".into()));
        }
        let mut mailboxes = self.server.mailboxes.lock().unwrap();
        let mut message = mailboxes
            .get_mut(from_folder)
            .and_then(|m| m.remove(&identity.uid))
            .ok_or_else(|| Error::Protocol(format!("no such message: {identity}")))?;
        let uid = self.server.next_uid.fetch_add(1, Ordering::SeqCst);
        message.identity = MessageIdentity::new(to_folder, uid);
        mailboxes
            .entry(to_folder.to_string())
            .or_default()
            .insert(uid, message);
        Ok(())
    }

    async fn close(&self) {
        self.stats.close_calls.fetch_add(1, Ordering::SeqCst);
        self.stats.closed.store(true, Ordering::SeqCst);
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("belege@example.com", "secret")
}

/// Waits for the next event, failing the test after a generous timeout.
pub async fn next_event(events: &mut EventReceiver) -> MailEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skips events until the prefetch of `identity` has completed.
pub async fn wait_prefetched(events: &mut EventReceiver, identity: &MessageIdentity) {
    loop {
        if let MailEvent::PrefetchCompleted { identity: done } = next_event(events).await
            && &done == identity
        {
            return;
        }
    }
}
