//! Process lifecycle: PID file, shutdown signals and startup order.
//!
//! Startup runs strictly in this order: PID file, signal handlers, host
//! identity, listener. Shutdown is immediate: the listener stops, the PID
//! file is removed and control returns to the caller, which is expected to
//! exit the process without waiting for open sessions.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::LightSshdError;
use crate::security::{AuthorizedKeySet, HostIdentity, Provisioned};
use crate::server::{self, ServerContext};
use crate::session::SessionBroker;
use crate::Result;

/// Why [`run`] returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// A termination signal (or the caller's shutdown future) fired.
    Signal,
}

/// A PID file written at startup and removed at shutdown.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id, in decimal, to `path`.
    ///
    /// An existing file is overwritten.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        std::fs::write(&path, std::process::id().to_string()).map_err(|source| {
            LightSshdError::PidFile {
                path: path.clone(),
                source,
            }
        })?;
        debug!(path = %path.display(), "PID file written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Failures are logged and otherwise ignored.
    pub fn remove(self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "PID file removed"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "unable to remove PID file"),
        }
    }
}

/// SIGINT and SIGTERM listeners, registered when installed.
///
/// SIGKILL cannot be caught; a killed daemon leaves its PID file behind.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    pub fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the first termination signal.
    #[cfg(unix)]
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!(signal = "SIGINT", "shutdown requested"),
            _ = self.terminate.recv() => info!(signal = "SIGTERM", "shutdown requested"),
        }
    }

    /// Wait for the first termination signal.
    #[cfg(not(unix))]
    pub async fn recv(self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
    }
}

/// Run the daemon until SIGINT or SIGTERM.
pub async fn run(config: &Config) -> Result<Shutdown> {
    let pid_file = create_pid_file(config)?;
    let signals = match ShutdownSignals::install() {
        Ok(signals) => signals,
        Err(e) => return finish(pid_file, Err(e)),
    };
    finish(pid_file, start(config, signals.recv()).await)
}

/// Run the daemon until `shutdown` completes.
pub async fn run_until<F>(config: &Config, shutdown: F) -> Result<Shutdown>
where
    F: Future<Output = ()>,
{
    let pid_file = create_pid_file(config)?;
    finish(pid_file, start(config, shutdown).await)
}

fn create_pid_file(config: &Config) -> Result<Option<PidFile>> {
    config.pid_file.as_ref().map(PidFile::create).transpose()
}

fn finish(pid_file: Option<PidFile>, result: Result<Shutdown>) -> Result<Shutdown> {
    if let Some(pid_file) = pid_file {
        pid_file.remove();
    }
    result
}

async fn start<F>(config: &Config, shutdown: F) -> Result<Shutdown>
where
    F: Future<Output = ()>,
{
    let identity = HostIdentity::new(&config.auth.host_key);
    if identity.ensure()? == Provisioned::Existing {
        debug!(path = %identity.path().display(), "using existing host key");
    }
    let host_key = identity.load()?;

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .map_err(|source| LightSshdError::Bind {
            addr: config.server.listen.clone(),
            source,
        })?;

    let ctx = ServerContext::new(
        host_key,
        AuthorizedKeySet::new(&config.auth.authorized_keys),
        SessionBroker::new(config.server.default_command.clone()),
    );
    server::serve(listener, ctx, shutdown).await?;

    info!("lightsshd stopped");
    Ok(Shutdown::Signal)
}
