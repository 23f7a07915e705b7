//! # belegscanner-core
//!
//! Mailbox access layer for the Belegscanner receipt inbox.
//!
//! This crate provides:
//! - A bounded recency cache of fetched messages
//! - A client with separate primary and prefetch sessions
//! - Disconnect-safe connection slots for background work
//! - Prefetch orchestration around the process-and-archive flow
//! - The filtered message list, configuration file and keyring storage
//!
//! The wire protocol is supplied by a [`MailConnector`] implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod client;
pub mod config;
pub mod credentials;
mod error;
pub mod events;
pub mod listing;
pub mod model;
pub mod orchestrator;
pub mod protocol;
pub mod slot;

pub use cache::{DEFAULT_CAPACITY, RecencyCache};
pub use client::{ConnectionOf, DualConnectionClient};
pub use config::{Config, PrefetchConfig};
pub use error::{Error, Result};
pub use events::{EventReceiver, MailEvent};
pub use listing::MessageList;
pub use model::{
    Attachment, Credentials, MessageContent, MessageIdentity, MessageSummary, Role,
};
pub use orchestrator::{PrefetchOrchestrator, RequestId};
pub use protocol::{MailConnection, MailConnector};
pub use slot::ConnectionSlot;
