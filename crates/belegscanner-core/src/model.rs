//! Mailbox data model.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Identity of a message within one connected session.
///
/// Sequence identifiers are assigned by the server and are not guaranteed
/// stable across reconnects, so an identity is only meaningful for the
/// session it was obtained in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageIdentity {
    /// Mailbox (folder) name.
    pub mailbox: String,
    /// Server-assigned identifier within the mailbox.
    pub uid: u32,
}

impl MessageIdentity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(mailbox: impl Into<String>, uid: u32) -> Self {
        Self {
            mailbox: mailbox.into(),
            uid,
        }
    }
}

impl fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mailbox, self.uid)
    }
}

/// Lightweight listing record. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Message identity.
    pub identity: MessageIdentity,
    /// Sender address.
    pub sender: String,
    /// Message subject.
    pub subject: String,
    /// Message date.
    pub date: DateTime<Utc>,
    /// Whether the message carries attachments.
    pub has_attachments: bool,
}

/// Full fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    /// Message identity.
    pub identity: MessageIdentity,
    /// Decoded `From` header.
    pub sender: String,
    /// Decoded `Subject` header.
    pub subject: String,
    /// Message date.
    pub date: DateTime<Utc>,
    /// `Message-ID` header (may be empty).
    pub message_id: String,
    /// Plain text body.
    pub body_text: String,
    /// HTML body.
    pub body_html: Option<String>,
    /// Attachments in message order.
    pub attachments: Vec<Attachment>,
}

/// An email attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Decoded content.
    pub data: Bytes,
}

impl Attachment {
    /// Creates an attachment, deriving the size from the data.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            size: data.len() as u64,
            data,
        }
    }
}

/// Login credentials for one session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The two independent connection roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// User-driven operations (list, fetch, move).
    Primary,
    /// Background prefetch of the next message.
    Prefetch,
}

impl Role {
    /// Get display name for the role.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Prefetch => "prefetch",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
