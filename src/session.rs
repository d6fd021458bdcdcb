//! Active-user session persisted across runs.
//!
//! Sign-in is identification, not authentication: the daemon trusts its
//! local caller, and the session only selects whose mailbox the engine
//! works on. The active address lives in a small file under the data dir.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub email: String,
}

impl Session {
    fn session_path() -> Result<PathBuf> {
        Ok(Config::data_dir()?.join("session"))
    }

    /// The signed-in user, if any.
    pub fn load() -> Result<Option<Self>> {
        let path = Self::session_path()?;
        if !path.exists() {
            return Ok(None);
        }
        let email = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?
            .trim()
            .to_string();
        if email.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { email }))
    }

    /// Sign in as `email` and persist it as the active session.
    pub fn signin(email: &str) -> Result<Self> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            anyhow::bail!("'{email}' does not look like an email address");
        }
        let path = Self::session_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }
        fs::write(&path, email)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        Ok(Self {
            email: email.to_string(),
        })
    }

    /// Clear the active session. Signing out when nobody is signed in is
    /// not an error.
    pub fn signout() -> Result<()> {
        let path = Self::session_path()?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove session file: {}", path.display()))
            }
        }
    }
}
