//! Error types for lightsshd.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for lightsshd operations.
#[derive(Error, Debug)]
pub enum LightSshdError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// Host identity could not be provisioned or loaded.
    #[error("host key error ({}): {message}", path.display())]
    HostKey { path: PathBuf, message: String },

    /// Authorized keys file could not be read.
    #[error("unable to read authorized keys file {}: {source}", path.display())]
    AuthorizedKeys {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PID file could not be written.
    #[error("unable to write PID file {}: {source}", path.display())]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Listener could not bind the configured address.
    #[error("unable to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// PTY-related error.
    #[error("PTY error: {0}")]
    Pty(String),

    /// Requested command cannot be run.
    #[error("invalid command: {0}")]
    Command(String),

    /// SSH transport error.
    #[error("SSH transport error: {0}")]
    Transport(#[from] russh::Error),
}

/// Convenience Result type for lightsshd operations.
pub type Result<T> = std::result::Result<T, LightSshdError>;
