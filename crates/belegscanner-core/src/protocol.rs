//! Interface to the mail-protocol collaborator.
//!
//! The access layer never speaks the wire protocol itself. A backend
//! provides a [`MailConnector`] that opens authenticated sessions, each
//! represented by a [`MailConnection`]. Connection methods take `&self` so a
//! handle captured into a background task stays usable while the owning
//! [`ConnectionSlot`](crate::ConnectionSlot) is cleared or replaced.

use async_trait::async_trait;

use crate::Result;
use crate::model::{Credentials, MessageContent, MessageIdentity, MessageSummary};

/// Opens authenticated sessions to the mail server.
#[async_trait]
pub trait MailConnector: Send + Sync + 'static {
    /// Session type produced by this connector.
    type Connection: MailConnection;

    /// Connects and authenticates a new, independent session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`](crate::Error::Protocol) if the server is
    /// unreachable or rejects the credentials.
    async fn connect(&self, credentials: &Credentials) -> Result<Self::Connection>;
}

/// One authenticated session.
#[async_trait]
pub trait MailConnection: Send + Sync + 'static {
    /// Lists the messages of a folder in server order.
    ///
    /// # Errors
    ///
    /// Returns an error if the server call fails.
    async fn list_summaries(&self, folder: &str) -> Result<Vec<MessageSummary>>;

    /// Fetches the full content of a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the server call fails or the message is gone.
    async fn fetch_message(&self, identity: &MessageIdentity) -> Result<MessageContent>;

    /// Moves a message between folders. Assumed atomic.
    ///
    /// # Errors
    ///
    /// Returns an error if the server call fails.
    async fn move_message(
        &self,
        identity: &MessageIdentity,
        from_folder: &str,
        to_folder: &str,
    ) -> Result<()>;

    /// Ends the session. Idempotent; later calls on this handle fail.
    async fn close(&self);
}
