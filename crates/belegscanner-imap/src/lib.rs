//! # belegscanner-imap
//!
//! IMAP implementation of the belegscanner mail-protocol seam.
//!
//! [`ImapConnector`] opens implicit-TLS sessions (rustls with the webpki
//! root store) and authenticates with LOGIN. Each [`ImapConnection`] is one
//! independent session, so the primary and prefetch roles never share a
//! socket.
//!
//! ```ignore
//! use belegscanner_core::{Credentials, PrefetchConfig, PrefetchOrchestrator};
//! use belegscanner_imap::ImapConnector;
//!
//! let connector = ImapConnector::new("imap.example.com", 993);
//! let (orchestrator, events) = PrefetchOrchestrator::new(connector, PrefetchConfig::new())?;
//! orchestrator.connect_primary(&Credentials::new("user", "secret")).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cell;
pub mod connection;
mod parse;
pub mod stream;

pub use connection::{ImapConnection, ImapConnector};
