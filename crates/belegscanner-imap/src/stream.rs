//! TLS transport for IMAP sessions.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use belegscanner_core::{Error, Result};

/// Encrypted stream an IMAP session runs over.
pub type ImapStream = TlsStream<TcpStream>;

/// Creates a TLS connector with the webpki root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Connects to a server with TLS from the start (IMAPS).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the TCP connect or the TLS handshake fails,
/// or if `host` is not a valid server name.
pub async fn connect_tls(host: &str, port: u16) -> Result<ImapStream> {
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::Protocol(format!("TCP connection to {host}:{port} failed: {e}")))?;

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::Protocol(format!("Invalid server name {host}: {e}")))?;

    create_tls_connector()
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Protocol(format!("TLS handshake with {host} failed: {e}")))
}
