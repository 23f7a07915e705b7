//! IMAP sessions behind the [`MailConnector`] seam.
//!
//! Every call selects its folder first; nothing relies on state left over
//! from an earlier call. Moves are COPY, STORE `\Deleted`, EXPUNGE, which
//! every IMAP4rev1 server supports.

use async_imap::types::Fetch;
use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use belegscanner_core::{
    Credentials, Error, MailConnection, MailConnector, MessageContent, MessageIdentity,
    MessageSummary, Result,
};

use crate::cell::SessionCell;
use crate::parse;
use crate::stream::{ImapStream, connect_tls};

type ImapSession = async_imap::Session<ImapStream>;

fn protocol(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Protocol(format!("{context}: {e}"))
}

/// Maps a failed command, telling a dead transport apart from a refusal.
fn command(context: &str, e: async_imap::error::Error) -> Error {
    match e {
        async_imap::error::Error::Io(_) | async_imap::error::Error::ConnectionLost => {
            Error::ConnectionLost(format!("{context}: {e}"))
        }
        other => protocol(context, other),
    }
}

/// Opens authenticated IMAPS sessions to one server.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
}

impl ImapConnector {
    /// Creates a connector for `host:port` (implicit TLS).
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Server host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    type Connection = ImapConnection;

    async fn connect(&self, credentials: &Credentials) -> Result<ImapConnection> {
        info!(host = %self.host, port = self.port, "Connecting to IMAP server");
        let stream = connect_tls(&self.host, self.port).await?;

        let mut client = async_imap::Client::new(stream);
        let _greeting = client
            .read_response()
            .await
            .transpose()
            .map_err(|e| protocol("Failed to read server greeting", e))?;

        let session = client
            .login(&credentials.username, &credentials.password)
            .await
            .map_err(|(e, _)| protocol(&format!("Login failed for {}", credentials.username), e))?;

        debug!(host = %self.host, "Session established");
        Ok(ImapConnection {
            host: self.host.clone(),
            session: SessionCell::new(session),
        })
    }
}

/// One authenticated IMAP session.
///
/// Commands are serialized on the session. [`close`](MailConnection::close)
/// does not wait for a running command: it marks the session closed and the
/// command logs out once it finishes.
pub struct ImapConnection {
    host: String,
    session: SessionCell<ImapSession>,
}

impl ImapConnection {
    /// Logs out if `close` was called while the guard was held.
    async fn release(&self, guard: MutexGuard<'_, Option<ImapSession>>) {
        logout(self.session.release(guard), &self.host).await;
    }

    async fn select(session: &mut ImapSession, folder: &str) -> Result<u32> {
        let mailbox = session
            .select(folder)
            .await
            .map_err(|e| command(&format!("SELECT {folder} failed"), e))?;
        Ok(mailbox.exists)
    }

    async fn list(session: &mut ImapSession, folder: &str) -> Result<Vec<MessageSummary>> {
        if Self::select(session, folder).await? == 0 {
            return Ok(Vec::new());
        }
        let fetches: Vec<Fetch> = session
            .fetch("1:*", "(UID ENVELOPE BODYSTRUCTURE)")
            .await
            .map_err(|e| command("FETCH failed", e))?
            .try_collect()
            .await
            .map_err(|e| command("FETCH failed", e))?;

        let summaries: Vec<_> = fetches
            .iter()
            .filter_map(|fetch| parse::summary_from_fetch(folder, fetch))
            .collect();
        if summaries.len() < fetches.len() {
            warn!(
                folder,
                skipped = fetches.len() - summaries.len(),
                "Skipped responses without envelope"
            );
        }
        Ok(summaries)
    }

    async fn fetch(session: &mut ImapSession, identity: &MessageIdentity) -> Result<MessageContent> {
        Self::select(session, &identity.mailbox).await?;
        let fetches: Vec<Fetch> = session
            .uid_fetch(identity.uid.to_string(), "(UID BODY.PEEK[])")
            .await
            .map_err(|e| command(&format!("UID FETCH {} failed", identity.uid), e))?
            .try_collect()
            .await
            .map_err(|e| command(&format!("UID FETCH {} failed", identity.uid), e))?;

        let raw = fetches
            .iter()
            .find_map(Fetch::body)
            .ok_or_else(|| Error::Protocol(format!("Message {identity} not found")))?;
        parse::content_from_raw(identity.clone(), raw)
    }

    async fn archive(
        session: &mut ImapSession,
        identity: &MessageIdentity,
        from_folder: &str,
        to_folder: &str,
    ) -> Result<()> {
        let uid = identity.uid.to_string();
        Self::select(session, from_folder).await?;

        session
            .uid_copy(&uid, to_folder)
            .await
            .map_err(|e| command(&format!("COPY to {to_folder} failed"), e))?;

        let _: Vec<Fetch> = session
            .uid_store(&uid, "+FLAGS (\\Deleted)")
            .await
            .map_err(|e| command("STORE \\Deleted failed", e))?
            .try_collect()
            .await
            .map_err(|e| command("STORE \\Deleted failed", e))?;

        let _: Vec<u32> = session
            .expunge()
            .await
            .map_err(|e| command("EXPUNGE failed", e))?
            .try_collect()
            .await
            .map_err(|e| command("EXPUNGE failed", e))?;
        Ok(())
    }
}

async fn logout(session: Option<ImapSession>, host: &str) {
    if let Some(mut session) = session {
        match session.logout().await {
            Ok(()) => debug!(host, "Logged out"),
            Err(e) => debug!(host, "Logout failed: {e}"),
        }
    }
}

#[async_trait]
impl MailConnection for ImapConnection {
    async fn list_summaries(&self, folder: &str) -> Result<Vec<MessageSummary>> {
        let mut guard = self.session.lock().await?;
        let result = match guard.as_mut() {
            Some(session) => Self::list(session, folder).await,
            None => Err(Error::ConnectionLost("connection closed".into())),
        };
        self.release(guard).await;
        result
    }

    async fn fetch_message(&self, identity: &MessageIdentity) -> Result<MessageContent> {
        let mut guard = self.session.lock().await?;
        let result = match guard.as_mut() {
            Some(session) => Self::fetch(session, identity).await,
            None => Err(Error::ConnectionLost("connection closed".into())),
        };
        self.release(guard).await;
        result
    }

    async fn move_message(
        &self,
        identity: &MessageIdentity,
        from_folder: &str,
        to_folder: &str,
    ) -> Result<()> {
        let mut guard = self.session.lock().await?;
        let result = match guard.as_mut() {
            Some(session) => Self::archive(session, identity, from_folder, to_folder).await,
            None => Err(Error::ConnectionLost("connection closed".into())),
        };
        self.release(guard).await;
        result
    }

    async fn close(&self) {
        // A running command logs out in `release` instead
        logout(self.session.close(), &self.host).await;
    }
}

impl std::fmt::Debug for ImapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnection")
            .field("host", &self.host)
            .field("closed", &self.session.is_closed())
            .finish_non_exhaustive()
    }
}
