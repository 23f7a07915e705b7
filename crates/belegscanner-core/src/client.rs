//! Protocol client with two independent sessions.
//!
//! The primary session serves user-driven operations; the prefetch session
//! is reserved for speculative background fetches. Some servers reject or
//! mis-order pipelined requests on a single session, so the two roles never
//! share a handle.
//!
//! A call that fails with [`Error::ConnectionLost`] removes the handle it
//! ran on from its slot (unless the slot has moved on to a newer handle), so
//! later calls fail fast with [`Error::NotConnected`] until a reconnect.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::model::{Credentials, MessageContent, MessageIdentity, MessageSummary, Role};
use crate::protocol::{MailConnection, MailConnector};
use crate::slot::ConnectionSlot;
use crate::{Error, Result};

/// Connection type produced by a connector.
pub type ConnectionOf<K> = <K as MailConnector>::Connection;

/// Owns the primary and prefetch connection slots.
pub struct DualConnectionClient<K: MailConnector> {
    connector: K,
    primary: ConnectionSlot<ConnectionOf<K>>,
    prefetch: ConnectionSlot<ConnectionOf<K>>,
}

impl<K: MailConnector> DualConnectionClient<K> {
    /// Creates a disconnected client.
    #[must_use]
    pub const fn new(connector: K) -> Self {
        Self {
            connector,
            primary: ConnectionSlot::new(Role::Primary),
            prefetch: ConnectionSlot::new(Role::Prefetch),
        }
    }

    const fn slot(&self, role: Role) -> &ConnectionSlot<ConnectionOf<K>> {
        match role {
            Role::Primary => &self.primary,
            Role::Prefetch => &self.prefetch,
        }
    }

    /// Captures the handle for `role`, failing fast when the slot is empty.
    fn capture(&self, role: Role) -> Result<Arc<ConnectionOf<K>>> {
        self.slot(role).capture().ok_or(Error::NotConnected(role))
    }

    /// Tears down `connection` if `result` reports its transport is gone.
    async fn settle<T>(
        &self,
        role: Role,
        connection: &Arc<ConnectionOf<K>>,
        result: Result<T>,
    ) -> Result<T> {
        if let Err(e) = &result
            && e.is_connection_lost()
            && self.slot(role).clear_if(connection)
        {
            warn!(%role, "Session dropped: {e}");
            connection.close().await;
        }
        result
    }

    async fn connect(&self, role: Role, credentials: &Credentials) -> Result<()> {
        match self.connector.connect(credentials).await {
            Ok(connection) => {
                self.slot(role).set(connection).await;
                info!(%role, user = %credentials.username, "Connected");
                Ok(())
            }
            Err(e) => {
                // A failed connect never disturbs an existing session
                warn!(%role, "Connect failed: {e}");
                Err(e)
            }
        }
    }

    /// Opens the primary session.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting fails; the slot is left unchanged.
    pub async fn connect_primary(&self, credentials: &Credentials) -> Result<()> {
        self.connect(Role::Primary, credentials).await
    }

    /// Opens the prefetch session.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting fails; the slot is left unchanged.
    pub async fn connect_prefetch(&self, credentials: &Credentials) -> Result<()> {
        self.connect(Role::Prefetch, credentials).await
    }

    /// Returns true if the slot for `role` holds a session.
    #[must_use]
    pub fn is_connected(&self, role: Role) -> bool {
        self.slot(role).is_active()
    }

    /// Lists a folder on the primary session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without I/O if the primary slot is
    /// empty, or the protocol failure.
    pub async fn list_summaries(&self, folder: &str) -> Result<Vec<MessageSummary>> {
        let connection = self.capture(Role::Primary)?;
        let result = connection.list_summaries(folder).await;
        let summaries = self.settle(Role::Primary, &connection, result).await?;
        debug!(folder, count = summaries.len(), "Listed folder");
        Ok(summaries)
    }

    /// Fetches a message on the primary session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without I/O if the primary slot is
    /// empty, or the protocol failure.
    pub async fn fetch_message(&self, identity: &MessageIdentity) -> Result<MessageContent> {
        let connection = self.capture(Role::Primary)?;
        let result = connection.fetch_message(identity).await;
        self.settle(Role::Primary, &connection, result).await
    }

    /// Fetches a message on the prefetch session.
    ///
    /// The handle is captured once, up front; a concurrent
    /// [`disconnect`](Self::disconnect) does not affect this call beyond
    /// whatever the closed session itself reports. A lost session is removed
    /// from the prefetch slot only if no reconnect has replaced it meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without I/O if the prefetch slot is
    /// empty, or the protocol failure.
    pub async fn fetch_message_prefetch(
        &self,
        identity: &MessageIdentity,
    ) -> Result<MessageContent> {
        let connection = self.capture(Role::Prefetch)?;
        let result = connection.fetch_message(identity).await;
        self.settle(Role::Prefetch, &connection, result).await
    }

    /// Moves a message on the primary session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without I/O if the primary slot is
    /// empty, or the protocol failure.
    pub async fn move_message(
        &self,
        identity: &MessageIdentity,
        from_folder: &str,
        to_folder: &str,
    ) -> Result<()> {
        let connection = self.capture(Role::Primary)?;
        let result = connection
            .move_message(identity, from_folder, to_folder)
            .await;
        self.settle(Role::Primary, &connection, result).await?;
        info!(%identity, from_folder, to_folder, "Moved message");
        Ok(())
    }

    /// Closes only the prefetch session.
    pub async fn disconnect_prefetch(&self) {
        self.prefetch.clear().await;
    }

    /// Closes both sessions. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        self.primary.clear().await;
        self.prefetch.clear().await;
    }
}

impl<K: MailConnector> std::fmt::Debug for DualConnectionClient<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualConnectionClient")
            .field("primary", &self.primary)
            .field("prefetch", &self.prefetch)
            .finish_non_exhaustive()
    }
}
