//! Authorized keys file handling.
//!
//! The file is re-read on every authentication attempt, so edits (and
//! removal) take effect for the next connection without a restart.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use russh::keys::ssh_key::authorized_keys::Entry;
use russh::keys::PublicKey;
use tracing::{debug, error, info, warn};

use crate::error::LightSshdError;
use crate::Result;

/// One parsed line of an authorized keys file.
#[derive(Debug, Clone)]
pub struct AuthorizedKeyEntry {
    public_key: PublicKey,
    comment: String,
}

impl AuthorizedKeyEntry {
    /// Parse a single `[options] <algorithm> <base64> [comment]` record.
    pub fn parse(line: &str) -> std::result::Result<Self, russh::keys::ssh_key::Error> {
        let entry = Entry::from_str(line.trim())?;
        let public_key = entry.public_key().clone();
        let comment = public_key.comment().to_string();
        Ok(Self {
            public_key,
            comment,
        })
    }

    /// The authorized public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Trailing comment, empty if the line had none.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Whether `candidate` carries exactly this entry's key material.
    ///
    /// Comments are not part of the comparison.
    pub fn matches(&self, candidate: &PublicKey) -> bool {
        self.public_key.key_data() == candidate.key_data()
    }
}

/// Returns true for lines that carry no key.
fn is_skippable(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}

/// Load every well-formed entry from the file at `path`, in file order.
///
/// Malformed lines are logged and skipped. Fails only when the file cannot
/// be opened or read.
pub fn load(path: &Path) -> Result<Vec<AuthorizedKeyEntry>> {
    let io_err = |source| LightSshdError::AuthorizedKeys {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut entries = Vec::new();
    let mut raw = Vec::new();
    let mut line_num = 0usize;

    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw).map_err(io_err)? == 0 {
            break;
        }
        line_num += 1;

        let Ok(line) = std::str::from_utf8(&raw) else {
            warn!(file = %path.display(), line = line_num, "skipping non-UTF-8 authorized key line");
            continue;
        };

        if is_skippable(line) {
            continue;
        }

        match AuthorizedKeyEntry::parse(line) {
            Ok(entry) => {
                debug!(comment = entry.comment(), line = line_num, "loaded authorized key");
                entries.push(entry);
            }
            Err(e) => {
                warn!(
                    file = %path.display(),
                    line = line_num,
                    error = %e,
                    "failed to parse authorized key line"
                );
            }
        }
    }

    debug!(count = entries.len(), file = %path.display(), "loaded authorized keys");
    Ok(entries)
}

/// The set of client keys allowed to log in, backed by a file.
#[derive(Debug, Clone)]
pub struct AuthorizedKeySet {
    path: PathBuf,
}

impl AuthorizedKeySet {
    /// Create a set backed by the file at `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current contents of the backing file.
    pub fn load(&self) -> Result<Vec<AuthorizedKeyEntry>> {
        load(&self.path)
    }

    /// Find the first entry matching `candidate` in the current file contents.
    pub fn find(&self, candidate: &PublicKey) -> Result<Option<AuthorizedKeyEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .find(|entry| entry.matches(candidate)))
    }

    /// Decide whether `candidate` may log in, recording the decision.
    ///
    /// An unreadable file denies the attempt; it never takes the daemon down.
    pub fn authorize(
        &self,
        user: &str,
        remote_addr: Option<SocketAddr>,
        candidate: &PublicKey,
    ) -> bool {
        let remote_addr = remote_addr.map(|a| a.to_string()).unwrap_or_default();

        match self.find(candidate) {
            Ok(Some(entry)) => {
                info!(
                    user,
                    remote_addr = %remote_addr,
                    key_comment = entry.comment(),
                    "authentication successful"
                );
                true
            }
            Ok(None) => {
                warn!(
                    user,
                    remote_addr = %remote_addr,
                    algorithm = %candidate.algorithm(),
                    "authentication failed - public key not authorized"
                );
                false
            }
            Err(e) => {
                error!(user, remote_addr = %remote_addr, error = %e, "unable to load authorized keys");
                false
            }
        }
    }
}
