//! SSH listener.
//!
//! Accepts TCP connections and runs the SSH protocol on each one with
//! [`russh`], authenticating peers against the [`AuthorizedKeySet`] and
//! handing session channels to the [`SessionBroker`].

mod channel;
mod handler;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::PrivateKey;
use russh::{MethodKind, MethodSet};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::security::AuthorizedKeySet;
use crate::session::SessionBroker;
use crate::Result;

pub use channel::ChannelSession;
pub use handler::ConnectionHandler;

/// Delay after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Shared, immutable state handed to every connection.
#[derive(Clone)]
pub struct ServerContext {
    pub ssh: Arc<russh::server::Config>,
    pub keys: Arc<AuthorizedKeySet>,
    pub broker: Arc<SessionBroker>,
}

impl ServerContext {
    pub fn new(host_key: PrivateKey, keys: AuthorizedKeySet, broker: SessionBroker) -> Self {
        Self {
            ssh: Arc::new(ssh_config(host_key)),
            keys: Arc::new(keys),
            broker: Arc::new(broker),
        }
    }
}

/// Transport settings: the host key, public-key authentication only, and
/// no idle timeout.
pub fn ssh_config(host_key: PrivateKey) -> russh::server::Config {
    russh::server::Config {
        keys: vec![host_key],
        methods: MethodSet::from(&[MethodKind::PublicKey][..]),
        auth_rejection_time: Duration::from_secs(1),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        inactivity_timeout: None,
        ..Default::default()
    }
}

/// Accept connections on `listener` until `shutdown` completes.
///
/// Each connection runs on its own task. Connections still open when
/// `shutdown` fires are not waited for.
pub async fn serve<F>(listener: TcpListener, ctx: ServerContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    if let Ok(addr) = listener.local_addr() {
        info!(listen = %addr, "accepting SSH connections");
    }

    loop {
        let (stream, peer_addr) = tokio::select! {
            _ = &mut shutdown => {
                debug!("listener stopping");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "unable to set TCP_NODELAY");
        }

        let handler = ConnectionHandler::new(ctx.clone(), peer_addr);
        let config = Arc::clone(&ctx.ssh);
        tokio::spawn(async move {
            let id = handler.id();
            debug!(session = %id, remote_addr = %peer_addr, "connection accepted");

            match russh::server::run_stream(config, stream, handler).await {
                Ok(running) => {
                    if let Err(e) = running.await {
                        debug!(session = %id, error = %e, "connection ended with error");
                    }
                }
                Err(e) => debug!(session = %id, error = %e, "SSH handshake failed"),
            }
            debug!(session = %id, "connection closed");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::keys::ssh_key::rand_core::OsRng;
    use russh::keys::ssh_key::Algorithm;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    fn context() -> ServerContext {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        ServerContext::new(
            key,
            AuthorizedKeySet::new("/nonexistent/authorized_keys"),
            SessionBroker::default(),
        )
    }

    #[test]
    fn test_ssh_config() {
        let ctx = context();
        assert_eq!(ctx.ssh.keys.len(), 1);
        assert_eq!(ctx.ssh.auth_rejection_time, Duration::from_secs(1));
        assert!(ctx.ssh.inactivity_timeout.is_none());
    }

    #[tokio::test]
    async fn test_serve_sends_banner_and_stops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(serve(listener, context(), async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut banner = [0u8; 8];
        tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut banner))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&banner, b"SSH-2.0-");

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
