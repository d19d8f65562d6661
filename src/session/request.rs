//! What a connected peer asked for, and the capability trait sessions expose.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

use super::SessionId;
use crate::error::LightSshdError;
use crate::pty::PtySize;
use crate::Result;

/// A pty request from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalRequest {
    /// Terminal type, e.g. `xterm-256color`. May be empty.
    pub term: String,
    /// Initial window size.
    pub size: PtySize,
}

impl TerminalRequest {
    pub fn new(term: impl Into<String>, size: PtySize) -> Self {
        Self {
            term: term.into(),
            size,
        }
    }
}

/// Everything the broker needs to know about one accepted session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Identifier used to correlate log records.
    pub id: SessionId,
    /// User name the peer authenticated as.
    pub user: String,
    /// Peer address.
    pub remote_addr: SocketAddr,
    /// Requested command line, already split. Empty asks for the default.
    pub command: Vec<String>,
    /// Terminal request, if the peer sent one.
    pub terminal: Option<TerminalRequest>,
}

impl SessionRequest {
    pub fn new(id: SessionId, user: impl Into<String>, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            user: user.into(),
            remote_addr,
            command: Vec::new(),
            terminal: None,
        }
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_terminal(mut self, terminal: TerminalRequest) -> Self {
        self.terminal = Some(terminal);
        self
    }
}

/// Split an exec request payload into argv using POSIX shell quoting rules.
///
/// An empty or whitespace-only payload yields an empty argv, which selects
/// the default command. Unbalanced quotes are rejected.
pub fn split_command(raw: &str) -> Result<Vec<String>> {
    shlex::split(raw).ok_or_else(|| LightSshdError::Command(format!("unbalanced quoting in {raw:?}")))
}

/// One accepted, authenticated session as seen by the broker.
///
/// The production implementation wraps an SSH channel; tests use in-memory
/// pipes.
pub trait ShellSession: Send + 'static {
    /// Bytes sent by the peer.
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// Bytes sent to the peer.
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// User, peer address, command and terminal request.
    fn request(&self) -> &SessionRequest;

    /// Give up the session's byte streams.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("echo hello").unwrap(), vec!["echo", "hello"]);
        assert_eq!(
            split_command(r#"sh -c 'echo "a b"; exit 1'"#).unwrap(),
            vec!["sh", "-c", r#"echo "a b"; exit 1"#]
        );
        assert!(split_command("").unwrap().is_empty());
        assert!(split_command("   ").unwrap().is_empty());
    }

    #[test]
    fn test_split_command_unbalanced() {
        assert!(matches!(
            split_command("echo 'oops"),
            Err(LightSshdError::Command(_))
        ));
    }

    #[test]
    fn test_request_builder() {
        let addr: SocketAddr = "192.0.2.1:40000".parse().unwrap();
        let request = SessionRequest::new(SessionId::from_raw(1), "deploy", addr)
            .with_command(["ls", "-la"])
            .with_terminal(TerminalRequest::new("xterm", PtySize::new(50, 132)));

        assert_eq!(request.user, "deploy");
        assert_eq!(request.command, vec!["ls".to_string(), "-la".to_string()]);
        assert_eq!(request.terminal.unwrap().size, PtySize::new(50, 132));
    }
}
