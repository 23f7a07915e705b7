//! Configuration file and prefetch tuning.
//!
//! The file is a plain `KEY=VALUE` list:
//!
//! ```text
//! # Belegscanner Konfiguration
//! ABLAGE_PFAD=/home/user/Belege
//! IMAP_SERVER=imap.example.com
//! IMAP_USER=user@example.com
//! IMAP_INBOX=Rechnungseingang
//! IMAP_ARCHIVE=Rechnungseingang/archiviert
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::cache::DEFAULT_CAPACITY;
use crate::{Error, Result};

/// Default IMAP port (implicit TLS).
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Default folder holding incoming receipts.
pub const DEFAULT_IMAP_INBOX: &str = "Rechnungseingang";

/// Default folder receiving processed receipts.
pub const DEFAULT_IMAP_ARCHIVE: &str = "Rechnungseingang/archiviert";

/// Default time a selection waits for a running prefetch of the same message.
pub const DEFAULT_PREFETCH_WAIT: Duration = Duration::from_secs(10);

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "belegscanner.conf";

const HEADER: &str = "# Belegscanner Konfiguration";

const KEY_ARCHIVE_PATH: &str = "ABLAGE_PFAD";
const KEY_SERVER: &str = "IMAP_SERVER";
const KEY_PORT: &str = "IMAP_PORT";
const KEY_USER: &str = "IMAP_USER";
const KEY_INBOX: &str = "IMAP_INBOX";
const KEY_ARCHIVE: &str = "IMAP_ARCHIVE";
const KEY_CACHE_SIZE: &str = "CACHE_SIZE";
const KEY_PREFETCH_WAIT: &str = "PREFETCH_WAIT_SECS";

/// Tuning for the cache and the prefetch path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchConfig {
    /// Maximum number of cached messages.
    pub cache_capacity: usize,
    /// How long a selection waits for a running prefetch of the same message.
    pub prefetch_wait: Duration,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            prefetch_wait: DEFAULT_PREFETCH_WAIT,
        }
    }
}

impl PrefetchConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache capacity.
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Sets the prefetch wait timeout.
    #[must_use]
    pub const fn prefetch_wait(mut self, timeout: Duration) -> Self {
        self.prefetch_wait = timeout;
        self
    }
}

/// Application configuration backed by a `KEY=VALUE` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    path: PathBuf,
    /// Directory receiving archived receipts.
    pub archive_path: Option<PathBuf>,
    /// IMAP server hostname.
    pub imap_server: Option<String>,
    /// IMAP server port.
    pub imap_port: u16,
    /// IMAP username.
    pub imap_user: Option<String>,
    /// Folder holding incoming receipts.
    pub imap_inbox: String,
    /// Folder receiving processed receipts.
    pub imap_archive: String,
    /// Cache and prefetch tuning.
    pub prefetch: PrefetchConfig,
}

/// Default location of the configuration file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

impl Config {
    /// Creates an unconfigured instance bound to `path`.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            archive_path: None,
            imap_server: None,
            imap_port: DEFAULT_IMAP_PORT,
            imap_user: None,
            imap_inbox: DEFAULT_IMAP_INBOX.to_string(),
            imap_archive: DEFAULT_IMAP_ARCHIVE.to_string(),
            prefetch: PrefetchConfig::default(),
        }
    }

    /// Loads the configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or holds
    /// invalid values.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Loads the configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or holds
    /// invalid values.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::empty(path));
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        Self::parse(path, &text)
    }

    /// Parses file contents. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed numbers or a zero cache size.
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let mut config = Self::empty(path);

        for (key, value) in parse_pairs(text) {
            match key {
                KEY_ARCHIVE_PATH => config.archive_path = non_empty(value).map(PathBuf::from),
                KEY_SERVER => config.imap_server = non_empty(value).map(str::to_string),
                KEY_USER => config.imap_user = non_empty(value).map(str::to_string),
                KEY_INBOX if !value.is_empty() => config.imap_inbox = value.to_string(),
                KEY_ARCHIVE if !value.is_empty() => config.imap_archive = value.to_string(),
                KEY_PORT => config.imap_port = parse_number(key, value)?,
                KEY_CACHE_SIZE => {
                    let size: usize = parse_number(key, value)?;
                    if size == 0 {
                        return Err(Error::Config(format!("{key} must be greater than zero")));
                    }
                    config.prefetch.cache_capacity = size;
                }
                KEY_PREFETCH_WAIT => {
                    config.prefetch.prefetch_wait = Duration::from_secs(parse_number(key, value)?);
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Writes the configuration back to its file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("create {}: {e}", parent.display())))?;
        }
        fs::write(&self.path, self.render())
            .map_err(|e| Error::Config(format!("write {}: {e}", self.path.display())))
    }

    fn render(&self) -> String {
        let mut lines = vec![HEADER.to_string()];
        if let Some(path) = &self.archive_path {
            lines.push(format!("{KEY_ARCHIVE_PATH}={}", path.display()));
        }
        if let Some(server) = &self.imap_server {
            lines.push(format!("{KEY_SERVER}={server}"));
        }
        if self.imap_port != DEFAULT_IMAP_PORT {
            lines.push(format!("{KEY_PORT}={}", self.imap_port));
        }
        if let Some(user) = &self.imap_user {
            lines.push(format!("{KEY_USER}={user}"));
        }
        lines.push(format!("{KEY_INBOX}={}", self.imap_inbox));
        lines.push(format!("{KEY_ARCHIVE}={}", self.imap_archive));
        if self.prefetch.cache_capacity != DEFAULT_CAPACITY {
            lines.push(format!("{KEY_CACHE_SIZE}={}", self.prefetch.cache_capacity));
        }
        if self.prefetch.prefetch_wait != DEFAULT_PREFETCH_WAIT {
            lines.push(format!(
                "{KEY_PREFETCH_WAIT}={}",
                self.prefetch.prefetch_wait.as_secs()
            ));
        }
        lines.join("\n") + "\n"
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if server and user are set.
    #[must_use]
    pub const fn is_email_configured(&self) -> bool {
        self.imap_server.is_some() && self.imap_user.is_some()
    }
}

/// Yields trimmed `(key, value)` pairs, skipping comments and blank lines.
fn parse_pairs(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("{key}={value}: {e}")))
}
