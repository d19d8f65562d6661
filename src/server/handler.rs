//! Per-connection SSH protocol handler.

use std::net::SocketAddr;
use std::sync::Arc;

use russh::keys::PublicKey;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId};
use tracing::{debug, info, warn};

use super::channel::ChannelSession;
use super::ServerContext;
use crate::error::LightSshdError;
use crate::pty::PtySize;
use crate::session::{split_command, SessionId, SessionRequest, TerminalRequest};

/// Protocol state for one TCP connection.
///
/// Only the first session channel is accepted; once its shell or exec
/// request arrives the channel is handed to the broker on its own task.
pub struct ConnectionHandler {
    ctx: ServerContext,
    id: SessionId,
    peer_addr: SocketAddr,
    user: Option<String>,
    channel: Option<Channel<Msg>>,
    channel_id: Option<ChannelId>,
    terminal: Option<TerminalRequest>,
}

impl ConnectionHandler {
    pub fn new(ctx: ServerContext, peer_addr: SocketAddr) -> Self {
        Self {
            ctx,
            id: SessionId::next(),
            peer_addr,
            user: None,
            channel: None,
            channel_id: None,
            terminal: None,
        }
    }

    /// Identifier attached to this connection's log records.
    pub fn id(&self) -> SessionId {
        self.id
    }

    fn reject() -> Auth {
        Auth::Reject {
            proceed_with_methods: None,
            partial_success: false,
        }
    }

    /// Hand the pending channel to the broker.
    fn start(
        &mut self,
        channel_id: ChannelId,
        command: Vec<String>,
        session: &mut Session,
    ) -> Result<(), LightSshdError> {
        let channel = match self.channel.take() {
            Some(channel) if channel.id() == channel_id => channel,
            other => {
                self.channel = other;
                debug!(session = %self.id, channel = ?channel_id, "request for unknown or running channel");
                session.channel_failure(channel_id)?;
                return Ok(());
            }
        };

        let mut request = SessionRequest::new(
            self.id,
            self.user.clone().unwrap_or_default(),
            self.peer_addr,
        )
        .with_command(command);
        if let Some(terminal) = self.terminal.take() {
            request = request.with_terminal(terminal);
        }

        session.channel_success(channel_id)?;

        let handle = session.handle();
        let broker = Arc::clone(&self.ctx.broker);
        let id = self.id;
        tokio::spawn(async move {
            let outcome = broker.handle(ChannelSession::new(request, channel)).await;

            if let Some(code) = outcome.exit_code {
                if handle.exit_status_request(channel_id, code).await.is_err() {
                    debug!(session = %id, "peer gone before exit status");
                }
            }
            if handle.close(channel_id).await.is_err() {
                debug!(session = %id, "peer gone before channel close");
            }
        });

        Ok(())
    }
}

impl Handler for ConnectionHandler {
    type Error = LightSshdError;

    /// Called after the peer proved possession of the private key.
    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let keys = Arc::clone(&self.ctx.keys);
        let candidate = public_key.clone();
        let (user_owned, peer_addr) = (user.to_string(), self.peer_addr);

        // The key file is read from disk on every attempt.
        let allowed = tokio::task::spawn_blocking(move || {
            keys.authorize(&user_owned, Some(peer_addr), &candidate)
        })
        .await
        .unwrap_or(false);

        if allowed {
            self.user = Some(user.to_string());
            Ok(Auth::Accept)
        } else {
            Ok(Self::reject())
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.channel_id.is_some() {
            warn!(session = %self.id, channel = ?channel.id(), "rejecting additional session channel");
            return Ok(false);
        }

        debug!(session = %self.id, channel = ?channel.id(), "session channel opened");
        self.channel_id = Some(channel.id());
        self.channel = Some(channel);
        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let pending = self.channel.as_ref().map(|c| c.id()) == Some(channel);
        if !pending {
            session.channel_failure(channel)?;
            return Ok(());
        }

        let size = PtySize::from_request(col_width, row_height);
        debug!(session = %self.id, term, rows = size.rows, cols = size.cols, "pty requested");
        self.terminal = Some(TerminalRequest::new(term, size));
        session.channel_success(channel)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        info!(session = %self.id, "shell requested");
        self.start(channel, Vec::new(), session)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let raw = String::from_utf8_lossy(data);
        match split_command(&raw) {
            Ok(command) => {
                info!(session = %self.id, command = %raw, "exec requested");
                self.start(channel, command, session)
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "rejecting exec request");
                session.channel_failure(channel)?;
                Ok(())
            }
        }
    }
}
