//! Interactive session state: the message list and command dispatch.
//!
//! Showing a message never blocks the prompt. The fetch runs as a tracked
//! selection and its [`MailEvent::FetchCompleted`] is printed only if it
//! belongs to the most recent `show`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use belegscanner_core::{
    Config, MailConnector, MailEvent, MessageContent, MessageIdentity, MessageList,
    PrefetchOrchestrator, RequestId,
};
use tracing::{debug, info, warn};

use crate::command::{Command, HELP};
use crate::filing::file_attachments;

/// Body lines printed by `show`.
const PREVIEW_LINES: usize = 30;

/// Front-end state for one connected account.
pub struct App<K: MailConnector> {
    orchestrator: PrefetchOrchestrator<K>,
    list: MessageList,
    inbox: String,
    archive: String,
    archive_path: Option<PathBuf>,
    /// Selection awaiting display, with its list position.
    pending: Option<(RequestId, usize)>,
}

impl<K: MailConnector> App<K> {
    pub fn new(orchestrator: PrefetchOrchestrator<K>, config: &Config) -> Self {
        Self {
            orchestrator,
            list: MessageList::new(),
            inbox: config.imap_inbox.clone(),
            archive: config.imap_archive.clone(),
            archive_path: config.archive_path.clone(),
            pending: None,
        }
    }

    pub const fn orchestrator(&self) -> &PrefetchOrchestrator<K> {
        &self.orchestrator
    }

    /// Runs one command. Returns false when the session should end.
    pub async fn handle(&mut self, command: Command) -> anyhow::Result<bool> {
        match command {
            Command::List => self.print_list(),
            Command::Filter(text) => {
                self.list.set_filter(&text);
                self.print_list();
            }
            Command::Show(n) => {
                let identity = self.nth(n)?;
                self.show(identity, n);
            }
            Command::Archive(n) => self.archive(n).await?,
            Command::Refresh => {
                // Positions change with the new listing
                self.orchestrator.cancel_selection();
                self.pending = None;
                self.refresh().await?;
                self.print_list();
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Applies a background outcome. Returns true if a message was printed.
    pub fn handle_event(&mut self, event: MailEvent) -> bool {
        match event {
            MailEvent::FetchCompleted {
                request,
                identity,
                result,
            } => {
                let Some((pending, position)) = self.pending else {
                    debug!(%identity, %request, "No selection pending");
                    return false;
                };
                if pending != request {
                    debug!(%identity, %request, "Ignoring superseded selection");
                    return false;
                }
                self.pending = None;
                match result {
                    Ok(content) => {
                        print_message(position, &content);
                        true
                    }
                    Err(e) => {
                        eprintln!("Mail {position} konnte nicht geladen werden: {e}");
                        false
                    }
                }
            }
            MailEvent::PrefetchCompleted { identity } => {
                debug!(%identity, "Prefetch ready");
                false
            }
            MailEvent::MoveCompleted { identity, result } => {
                match result {
                    Ok(()) => info!(%identity, "Archived"),
                    Err(e) => warn!(%identity, "Archiving failed: {e}"),
                }
                false
            }
        }
    }

    /// Starts loading `identity` for display; replaces any pending `show`.
    fn show(&mut self, identity: MessageIdentity, position: usize) {
        let request = self.orchestrator.request_selection(identity);
        self.pending = Some((request, position));
    }

    /// Reloads the inbox listing.
    pub async fn refresh(&mut self) -> anyhow::Result<()> {
        let summaries = self
            .orchestrator
            .list_summaries(&self.inbox)
            .await
            .with_context(|| format!("Ordner {} konnte nicht gelesen werden", self.inbox))?;
        debug!(count = summaries.len(), "Inbox loaded");
        self.list.set(summaries);
        Ok(())
    }

    pub fn print_list(&self) {
        let visible = self.list.visible();
        if visible.is_empty() {
            println!("Keine Mails in {}.", self.inbox);
            return;
        }
        for (i, m) in visible.iter().enumerate() {
            println!(
                "{:>3}  {}  {}{}  {}",
                i + 1,
                m.date.format("%d.%m.%Y"),
                if m.has_attachments { "📎 " } else { "" },
                m.sender,
                m.subject
            );
        }
        if let Some(filter) = self.list.filter() {
            println!("({} von {} Mails, Filter: {filter})", visible.len(), self.list.len());
        }
    }

    fn nth(&self, n: usize) -> anyhow::Result<MessageIdentity> {
        match self.list.visible().get(n.saturating_sub(1)) {
            Some(summary) => Ok(summary.identity.clone()),
            None => bail!("Keine Mail mit Nummer {n}"),
        }
    }

    async fn archive(&mut self, n: usize) -> anyhow::Result<()> {
        let current = self.nth(n)?;
        // Resolved from the list as shown, before anything changes
        let next = self.list.next_after(&current);

        let content = self.orchestrator.select_message(&current).await?;
        let base = self.archive_path.clone();
        let filed = Arc::clone(&content);
        self.orchestrator
            .process_and_advance(&current, next.as_ref(), &self.archive, || async move {
                if let Some(base) = base {
                    for path in file_attachments(&base, &filed).await? {
                        println!("Abgelegt: {}", path.display());
                    }
                }
                Ok::<(), belegscanner_core::Error>(())
            })
            .await
            .with_context(|| format!("Mail {n} wurde nicht archiviert"))?;

        self.list.remove(&current);
        println!("Archiviert: {}", content.subject);

        match next {
            Some(next) => {
                let position = self.list.position(&next).map_or(n, |i| i + 1);
                self.show(next, position);
            }
            None => {
                self.orchestrator.cancel_selection();
                self.pending = None;
            }
        }
        Ok(())
    }
}

fn print_message(position: usize, content: &MessageContent) {
    println!("── {position} ──────────────────────────────");
    println!("Von:     {}", content.sender);
    println!("Betreff: {}", content.subject);
    println!("Datum:   {}", content.date.format("%d.%m.%Y %H:%M"));
    for attachment in &content.attachments {
        println!(
            "Anhang:  {} ({}, {} Bytes)",
            attachment.filename, attachment.content_type, attachment.size
        );
    }
    println!();
    let body = if content.body_text.trim().is_empty() && content.body_html.is_some() {
        "(nur HTML-Inhalt)"
    } else {
        content.body_text.as_str()
    };
    let mut lines = body.lines();
    for line in lines.by_ref().take(PREVIEW_LINES) {
        println!("{line}");
    }
    if lines.next().is_some() {
        println!("…");
    }
}
