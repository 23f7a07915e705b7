//! Notifications delivered to the front end.
//!
//! Background work never calls into front-end state directly. Each outcome
//! is sent as a [`MailEvent`] over an unbounded channel and the receiving
//! side decides where and when to apply it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::Result;
use crate::model::{MessageContent, MessageIdentity};
use crate::orchestrator::RequestId;

/// Outcome of background mailbox work.
#[derive(Debug, Clone)]
pub enum MailEvent {
    /// A prefetched message is now in the cache.
    PrefetchCompleted {
        /// The prefetched message.
        identity: MessageIdentity,
    },
    /// A tracked selection finished and is still the current request.
    FetchCompleted {
        /// Request that produced this result.
        request: RequestId,
        /// The selected message.
        identity: MessageIdentity,
        /// Content or failure.
        result: Result<Arc<MessageContent>>,
    },
    /// A process/archive operation finished.
    MoveCompleted {
        /// The message that was to be moved.
        identity: MessageIdentity,
        /// Success, or why the message was not moved.
        result: Result<()>,
    },
}

/// Receiving half of the notification channel.
pub type EventReceiver = mpsc::UnboundedReceiver<MailEvent>;

/// Sending half of the notification channel.
#[derive(Debug, Clone)]
pub(crate) struct EventSender(mpsc::UnboundedSender<MailEvent>);

impl EventSender {
    pub(crate) fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Delivers an event. A closed receiver is not an error.
    pub(crate) fn send(&self, event: MailEvent) {
        if let Err(e) = self.0.send(event) {
            trace!("Event receiver dropped: {:?}", e.0);
        }
    }
}
