//! IMAP password storage in the system keyring.
//!
//! Entries are keyed by the IMAP user name under a fixed service name, so
//! the password survives config rewrites and never lands in the config file.

use keyring::Entry;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Service name used for keyring entries.
pub const SERVICE_NAME: &str = "de.kup.belegscanner";

fn entry(username: &str) -> Result<Entry> {
    Entry::new(SERVICE_NAME, username).map_err(|e| Error::Credential(e.to_string()))
}

/// Stores the IMAP password for `username`, replacing any previous one.
///
/// # Errors
///
/// Returns [`Error::Credential`] if the keyring is unavailable or rejects
/// the entry.
pub fn store_password(username: &str, password: &str) -> Result<()> {
    entry(username)?
        .set_password(password)
        .map_err(|e| Error::Credential(e.to_string()))?;
    debug!(username, "Stored IMAP password");
    Ok(())
}

/// Looks up the IMAP password for `username`.
///
/// # Errors
///
/// Returns [`Error::Credential`] if the keyring cannot be read. A missing
/// entry is `Ok(None)`.
pub fn get_password(username: &str) -> Result<Option<String>> {
    match entry(username)?.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => {
            debug!(username, "No IMAP password stored");
            Ok(None)
        }
        Err(e) => Err(Error::Credential(e.to_string())),
    }
}

/// Removes the IMAP password for `username`.
///
/// Returns false if there was nothing to delete.
///
/// # Errors
///
/// Returns [`Error::Credential`] if the keyring operation fails.
pub fn delete_password(username: &str) -> Result<bool> {
    match entry(username)?.delete_credential() {
        Ok(()) => {
            debug!(username, "Deleted IMAP password");
            Ok(true)
        }
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => {
            warn!("Failed to delete IMAP password: {e}");
            Err(Error::Credential(e.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TEST_USER: &str = "belegscanner-test@example.invalid";

    #[test]
    #[ignore = "requires a system keyring"]
    fn test_store_get_delete() {
        store_password(TEST_USER, "geheim").unwrap();
        assert_eq!(get_password(TEST_USER).unwrap().as_deref(), Some("geheim"));

        assert!(delete_password(TEST_USER).unwrap());
        assert_eq!(get_password(TEST_USER).unwrap(), None);
        assert!(!delete_password(TEST_USER).unwrap());
    }
}
