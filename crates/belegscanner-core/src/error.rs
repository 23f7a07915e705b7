//! Error types for the mailbox access layer.

use thiserror::Error;

use crate::model::Role;

/// Errors that can occur in mailbox operations.
///
/// The enum is `Clone` so that failures can be delivered through
/// [`MailEvent`](crate::MailEvent) notifications as well as returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The connection slot for this role holds no session; no I/O was attempted.
    #[error("Not connected: {0} connection is not established")]
    NotConnected(Role),

    /// The mail server rejected or failed a call.
    #[error("Protocol failure: {0}")]
    Protocol(String),

    /// The session's transport is gone (closed, reset, or logged out).
    /// The handle that reported it is unusable and gets removed from its slot.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The archive artifact step failed before the message was moved.
    #[error("Archive step failed: {0}")]
    Artifact(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(String),
}

impl Error {
    /// Returns true if the error was raised without attempting any I/O.
    #[must_use]
    pub const fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected(_))
    }

    /// Returns true if the session that produced this error cannot be reused.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
