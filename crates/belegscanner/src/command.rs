//! Line commands of the terminal front end.

use std::str::FromStr;

use anyhow::{Context, bail};

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the visible message list.
    List,
    /// Set (or with empty text, clear) the list filter.
    Filter(String),
    /// Show the message at a 1-based list position.
    Show(usize),
    /// File and archive the message at a 1-based list position.
    Archive(usize),
    /// Reload the inbox listing.
    Refresh,
    /// Print the command overview.
    Help,
    /// Disconnect and exit.
    Quit,
}

/// Command overview printed by `help`.
pub const HELP: &str = "\
Befehle:
  list            Liste anzeigen
  filter <text>   nach Absender/Betreff filtern (leer: Filter aufheben)
  show <n>        Mail Nr. n anzeigen
  archive <n>     Anhänge ablegen und Mail Nr. n archivieren
  refresh         Posteingang neu laden
  help            diese Hilfe
  quit            beenden";

fn position(arg: &str) -> anyhow::Result<usize> {
    let n: usize = arg
        .parse()
        .with_context(|| format!("'{arg}' ist keine Nummer"))?;
    if n == 0 {
        bail!("Nummern beginnen bei 1");
    }
    Ok(n)
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        match (word.to_lowercase().as_str(), rest) {
            ("list" | "ls", "") => Ok(Self::List),
            ("filter", text) => Ok(Self::Filter(text.to_string())),
            ("show", arg) if !arg.is_empty() => Ok(Self::Show(position(arg)?)),
            ("archive", arg) if !arg.is_empty() => Ok(Self::Archive(position(arg)?)),
            ("refresh", "") => Ok(Self::Refresh),
            ("help" | "?", "") => Ok(Self::Help),
            ("quit" | "exit" | "q", "") => Ok(Self::Quit),
            ("show" | "archive", _) => bail!("'{word}' braucht eine Nummer"),
            _ => bail!("Unbekannter Befehl: {line}"),
        }
    }
}
