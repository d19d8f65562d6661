//! PTY (Pseudo-Terminal) abstraction layer.
//!
//! This module allocates a pseudo-terminal pair, starts a command on the
//! slave side and hands back blocking reader/writer halves of the master,
//! plus adapters that move that blocking I/O off the tokio runtime.

mod async_adapter;
mod native;

pub use async_adapter::{AsyncPtyReader, AsyncPtyWriter};
pub use native::{NativePty, SpawnedCommand};

/// Size of a PTY in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    /// Number of rows (height).
    pub rows: u16,
    /// Number of columns (width).
    pub cols: u16,
}

impl PtySize {
    /// Create a new PtySize with the given dimensions.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Build a size from the 32-bit dimensions of an SSH pty request.
    ///
    /// Zero means "unspecified" on the wire and falls back to the default
    /// for that dimension; oversized values are clamped.
    pub fn from_request(cols: u32, rows: u32) -> Self {
        let default = Self::default();
        let clamp = |value: u32, fallback: u16| match value {
            0 => fallback,
            v => u16::try_from(v).unwrap_or(u16::MAX),
        };
        Self {
            rows: clamp(rows, default.rows),
            cols: clamp(cols, default.cols),
        }
    }
}

impl Default for PtySize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// A command to start on a pty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable path or name looked up in `PATH`.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Inherited variables to remove.
    pub env_remove: Vec<String>,
}

impl CommandSpec {
    /// Split a non-empty argv into program and arguments.
    ///
    /// Returns `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            env: Vec::new(),
            env_remove: Vec::new(),
        })
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Remove an inherited environment variable from the child.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Look up a variable set through [`CommandSpec::env`].
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
