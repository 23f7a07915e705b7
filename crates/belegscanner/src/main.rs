//! Belegscanner - work through a receipt inbox from the terminal
//!
//! Lists the configured IMAP inbox, shows messages, files their attachments
//! into the archive directory and moves them to the archive folder. The next
//! message is prefetched on a second connection while the current one is
//! being archived.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod app;
mod command;
mod filing;

use std::io::Write;

use anyhow::{Context, bail};
use belegscanner_core::{Config, Credentials, PrefetchOrchestrator, credentials};
use belegscanner_imap::ImapConnector;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app::App;
use command::Command;

/// Environment variable that overrides the keyring password.
const PASSWORD_ENV: &str = "BELEGSCANNER_PASSWORD";

type Input = Lines<BufReader<Stdin>>;

fn prompt(text: &str) {
    print!("{text}");
    // Prompt text only; a failed flush shows up on the next println
    let _ = std::io::stdout().flush();
}

async fn read_line(input: &mut Input) -> anyhow::Result<Option<String>> {
    input.next_line().await.context("Eingabe konnte nicht gelesen werden")
}

/// Environment first, then keyring, then an interactive prompt whose answer
/// is stored in the keyring.
async fn resolve_password(user: &str, input: &mut Input) -> anyhow::Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV)
        && !password.is_empty()
    {
        debug!("Using password from {PASSWORD_ENV}");
        return Ok(password);
    }

    match credentials::get_password(user) {
        Ok(Some(password)) => return Ok(password),
        Ok(None) => {}
        Err(e) => warn!("Keyring unavailable: {e}"),
    }

    prompt(&format!("Passwort für {user}: "));
    let Some(password) = read_line(input).await?.filter(|p| !p.is_empty()) else {
        bail!("Kein Passwort angegeben");
    };
    if let Err(e) = credentials::store_password(user, &password) {
        warn!("Password not saved: {e}");
    }
    Ok(password)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "belegscanner=info,belegscanner_core=info,belegscanner_imap=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Belegscanner");

    let config = Config::load_default().context("Konfiguration konnte nicht geladen werden")?;
    let (Some(server), Some(user)) = (config.imap_server.clone(), config.imap_user.clone()) else {
        bail!(
            "IMAP_SERVER und IMAP_USER fehlen in {}",
            config.path().display()
        );
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let password = resolve_password(&user, &mut input).await?;
    let credentials = Credentials::new(user, password);

    let connector = ImapConnector::new(server, config.imap_port);
    let (orchestrator, mut events) = PrefetchOrchestrator::new(connector, config.prefetch.clone())?;
    orchestrator
        .connect_primary(&credentials)
        .await
        .context("Anmeldung am IMAP-Server fehlgeschlagen")?;
    // Without the second session everything still works, just without prefetch
    if let Err(e) = orchestrator.connect_prefetch(&credentials).await {
        warn!("Prefetch connection unavailable: {e}");
    }

    let mut app = App::new(orchestrator, &config);
    app.refresh().await?;
    app.print_list();

    prompt("> ");
    loop {
        // next_line is cancel-safe, so an event never loses typed input
        let line = tokio::select! {
            line = read_line(&mut input) => line?,
            Some(event) = events.recv() => {
                if app.handle_event(event) {
                    prompt("> ");
                }
                continue;
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            prompt("> ");
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                prompt("> ");
                continue;
            }
        };
        match app.handle(command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("{e:#}"),
        }
        prompt("> ");
    }

    app.orchestrator().disconnect().await;
    Ok(())
}
