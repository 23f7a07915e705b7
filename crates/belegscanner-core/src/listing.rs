//! The message list the user works through.
//!
//! Holds the summaries of the inbox, newest first, and an optional text
//! filter. The identity to prefetch after processing a message is resolved
//! from the *visible* list before the processed message is removed.

use crate::model::{MessageIdentity, MessageSummary};

/// Sorted, filterable list of message summaries.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    messages: Vec<MessageSummary>,
    filter: Option<String>,
}

impl MessageList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents, sorting newest first. Clears the filter.
    pub fn set(&mut self, mut messages: Vec<MessageSummary>) {
        messages.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.identity.uid.cmp(&a.identity.uid))
        });
        self.messages = messages;
        self.filter = None;
    }

    /// Sets a case-insensitive filter on sender and subject. Blank clears it.
    pub fn set_filter(&mut self, text: &str) {
        let text = text.trim();
        self.filter = (!text.is_empty()).then(|| text.to_lowercase());
    }

    /// The active filter, lowercased.
    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    fn matches(&self, summary: &MessageSummary) -> bool {
        self.filter.as_deref().is_none_or(|needle| {
            summary.sender.to_lowercase().contains(needle)
                || summary.subject.to_lowercase().contains(needle)
        })
    }

    /// Summaries passing the filter, in display order.
    #[must_use]
    pub fn visible(&self) -> Vec<&MessageSummary> {
        self.messages.iter().filter(|m| self.matches(m)).collect()
    }

    /// Index of `identity` in the visible list.
    #[must_use]
    pub fn position(&self, identity: &MessageIdentity) -> Option<usize> {
        self.visible().iter().position(|m| &m.identity == identity)
    }

    /// The visible message following `identity`, or `None` at the end.
    #[must_use]
    pub fn next_after(&self, identity: &MessageIdentity) -> Option<MessageIdentity> {
        let visible = self.visible();
        let index = visible.iter().position(|m| &m.identity == identity)?;
        visible.get(index + 1).map(|m| m.identity.clone())
    }

    /// Removes a message, returning it if present.
    pub fn remove(&mut self, identity: &MessageIdentity) -> Option<MessageSummary> {
        let index = self.messages.iter().position(|m| &m.identity == identity)?;
        Some(self.messages.remove(index))
    }

    /// Total number of messages, ignoring the filter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the list holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
