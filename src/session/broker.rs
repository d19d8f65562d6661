//! Session broker: runs the requested command on a pty and shuttles bytes
//! between it and the peer until the command's output ends.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::request::{SessionRequest, ShellSession};
use crate::config::DEFAULT_COMMAND;
use crate::error::LightSshdError;
use crate::pty::{AsyncPtyReader, AsyncPtyWriter, CommandSpec, NativePty, SpawnedCommand};
use crate::Result;

/// Chunks in flight per direction.
const CHANNEL_CAPACITY: usize = 64;

/// Read size for peer input.
const INPUT_BUFFER_SIZE: usize = 8192;

/// Prefix of the daemon's own configuration variables.
const DAEMON_ENV_PREFIX: &str = "LIGHTSSHD_";

/// The daemon's log filter variable.
const LOG_ENV: &str = "RUST_LOG";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOutcome {
    /// Exit code of the command, `None` if it never started or its status
    /// could not be collected.
    pub exit_code: Option<u32>,
    /// Bytes written from the peer into the pty.
    pub bytes_in: u64,
    /// Bytes copied from the pty to the peer.
    pub bytes_out: u64,
}

/// Aborts the wrapped task when dropped, so no copy task outlives the
/// session that started it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    /// Wait for the task to finish on its own.
    async fn join(mut self) -> Option<T> {
        (&mut self.0).await.ok()
    }

    /// Stop the task and wait until it is gone.
    async fn cancel(mut self) -> Option<T> {
        self.0.abort();
        (&mut self.0).await.ok()
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Starts one command per session and bridges it to the peer.
#[derive(Debug, Clone)]
pub struct SessionBroker {
    default_command: Vec<String>,
}

impl SessionBroker {
    /// Create a broker that runs `default_command` when a session asks for
    /// no particular command.
    pub fn new(default_command: Vec<String>) -> Self {
        Self { default_command }
    }

    /// The argv used for sessions that request none.
    pub fn default_command(&self) -> &[String] {
        &self.default_command
    }

    /// The argv a session will run.
    pub fn resolve_command(&self, request: &SessionRequest) -> Vec<String> {
        if request.command.is_empty() {
            self.default_command.clone()
        } else {
            request.command.clone()
        }
    }

    /// Build the child description for `request`.
    ///
    /// A non-empty terminal type becomes `TERM`; otherwise any inherited
    /// `TERM` is removed so the child does not advertise the daemon's own
    /// terminal. The daemon's configuration variables are never passed on.
    pub fn command_spec(&self, request: &SessionRequest) -> Result<CommandSpec> {
        let argv = self.resolve_command(request);
        let mut spec = CommandSpec::from_argv(&argv)
            .ok_or_else(|| LightSshdError::Command("empty command line".into()))?;

        let inherited = std::env::vars_os().filter_map(|(key, _)| key.into_string().ok());
        for key in daemon_env_keys(inherited) {
            spec = spec.env_remove(key);
        }

        Ok(match &request.terminal {
            Some(terminal) if !terminal.term.is_empty() => spec.env("TERM", &terminal.term),
            _ => spec.env_remove("TERM"),
        })
    }

    /// Run one session to completion.
    ///
    /// Never fails: a command that cannot be started ends the session with
    /// no exit code and is logged. Returns once the command's output has
    /// been fully delivered (or the peer stopped accepting it) and the
    /// command has been reaped. The output stream is shut down on every
    /// path.
    pub async fn handle<S: ShellSession>(&self, session: S) -> SessionOutcome {
        let request = session.request().clone();
        let size = request.terminal.as_ref().map(|t| t.size).unwrap_or_default();

        info!(
            session = %request.id,
            user = %request.user,
            remote_addr = %request.remote_addr,
            command = ?self.resolve_command(&request),
            pty = request.terminal.is_some(),
            "session started"
        );

        let spawned = self
            .command_spec(&request)
            .and_then(|spec| NativePty::new().spawn(&spec, size));

        let (input, mut output) = session.into_split();
        let outcome = match spawned {
            Ok(spawned) => bridge(&request, spawned, input, &mut output).await,
            Err(e) => {
                error!(session = %request.id, error = %e, "unable to start session command");
                SessionOutcome::default()
            }
        };
        if let Err(e) = output.shutdown().await {
            debug!(session = %request.id, error = %e, "unable to close output stream");
        }

        info!(
            session = %request.id,
            user = %request.user,
            remote_addr = %request.remote_addr,
            exit_code = ?outcome.exit_code,
            bytes_in = outcome.bytes_in,
            bytes_out = outcome.bytes_out,
            "session ended"
        );
        outcome
    }
}

impl Default for SessionBroker {
    fn default() -> Self {
        Self::new(vec![DEFAULT_COMMAND.to_string()])
    }
}

async fn bridge<R, W>(
    request: &SessionRequest,
    mut spawned: SpawnedCommand,
    input: R,
    output: &mut W,
) -> SessionOutcome
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let id = request.id;
    let (pty_reader, pty_writer) = match (spawned.take_reader(), spawned.take_writer()) {
        (Ok(reader), Ok(writer)) => (reader, writer),
        (Err(e), _) | (_, Err(e)) => {
            error!(session = %id, error = %e, "unable to open pty streams");
            return SessionOutcome::default();
        }
    };
    let mut killer = spawned.killer();
    let child = spawned.take_child();
    debug!(session = %id, pid = ?spawned.pid(), "bridging pty");

    let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
    let (output_tx, mut output_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);

    let input_task = AbortOnDrop(tokio::spawn(copy_input(input, input_tx)));
    let writer_task = AbortOnDrop(tokio::spawn(AsyncPtyWriter::new(pty_writer, input_rx).run()));
    let reader_task = AbortOnDrop(tokio::spawn(AsyncPtyReader::new(pty_reader, output_tx).run()));

    let bytes_out = match copy_output(&mut output_rx, output).await {
        Ok(n) => n,
        Err(e) => {
            debug!(session = %id, error = %e, "peer stopped accepting output");
            if let Some(killer) = killer.as_mut() {
                if let Err(e) = killer.kill() {
                    debug!(session = %id, error = %e, "unable to kill session command");
                }
            }
            0
        }
    };
    drop(output_rx);

    input_task.cancel().await;

    let exit_code = match child {
        Some(mut child) => match tokio::task::spawn_blocking(move || child.wait()).await {
            Ok(Ok(status)) => Some(status.exit_code()),
            Ok(Err(e)) => {
                warn!(session = %id, error = %e, "unable to collect exit status");
                None
            }
            Err(e) => {
                warn!(session = %id, error = %e, "wait task failed");
                None
            }
        },
        None => None,
    };

    // The child is gone, so the slave side is closed and both pty halves
    // see a hangup on their next operation. The master writer is released
    // only now: dropping it writes an end-of-file sequence into the pty.
    let (bytes_in, pty_writer) = writer_task.join().await.unwrap_or((0, None));
    drop(pty_writer);
    reader_task.join().await;

    SessionOutcome {
        exit_code,
        bytes_in,
        bytes_out,
    }
}

/// Keys among `keys` that configure the daemon itself.
fn daemon_env_keys(keys: impl IntoIterator<Item = String>) -> Vec<String> {
    keys.into_iter()
        .filter(|key| key.starts_with(DAEMON_ENV_PREFIX) || key == LOG_ENV)
        .collect()
}

async fn copy_input<R>(mut input: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; INPUT_BUFFER_SIZE];

    loop {
        match input.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "peer input closed");
                break;
            }
        }
    }
}

async fn copy_output<W>(rx: &mut mpsc::Receiver<Vec<u8>>, output: &mut W) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    while let Some(chunk) = rx.recv().await {
        output.write_all(&chunk).await?;
        output.flush().await?;
        total += chunk.len() as u64;
    }
    Ok(total)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pty::PtySize;
    use crate::session::{SessionId, TerminalRequest};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    struct PipeSession {
        request: SessionRequest,
        input: DuplexStream,
        output: DuplexStream,
    }

    impl ShellSession for PipeSession {
        type Reader = DuplexStream;
        type Writer = DuplexStream;

        fn request(&self) -> &SessionRequest {
            &self.request
        }

        fn into_split(self) -> (Self::Reader, Self::Writer) {
            (self.input, self.output)
        }
    }

    /// The peer's ends of a [`PipeSession`].
    struct Peer {
        stdin: DuplexStream,
        stdout: DuplexStream,
    }

    impl Peer {
        async fn read_all(&mut self) -> String {
            let mut out = Vec::new();
            self.stdout.read_to_end(&mut out).await.unwrap();
            String::from_utf8_lossy(&out).replace("\r\n", "\n")
        }
    }

    fn request(command: &[&str]) -> SessionRequest {
        SessionRequest::new(SessionId::next(), "tester", "127.0.0.1:2222".parse().unwrap())
            .with_command(command.iter().copied())
    }

    fn session(request: SessionRequest) -> (PipeSession, Peer) {
        let (peer_stdin, input) = duplex(4096);
        let (output, peer_stdout) = duplex(64 * 1024);
        (
            PipeSession {
                request,
                input,
                output,
            },
            Peer {
                stdin: peer_stdin,
                stdout: peer_stdout,
            },
        )
    }

    async fn run(broker: &SessionBroker, request: SessionRequest) -> (SessionOutcome, String) {
        let (session, mut peer) = session(request);
        let (outcome, output) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(broker.handle(session), peer.read_all())
        })
        .await
        .expect("session did not finish");
        (outcome, output)
    }

    #[test]
    fn test_resolve_command_falls_back_to_default() {
        let broker = SessionBroker::new(vec!["/bin/zsh".into(), "-l".into()]);
        assert_eq!(broker.resolve_command(&request(&[])), vec!["/bin/zsh", "-l"]);
        assert_eq!(broker.resolve_command(&request(&["ls"])), vec!["ls"]);
        assert_eq!(SessionBroker::default().default_command(), ["/bin/bash"]);
    }

    #[test]
    fn test_command_spec_term_handling() {
        let broker = SessionBroker::default();

        let with_term = request(&["top"])
            .with_terminal(TerminalRequest::new("xterm-256color", PtySize::new(40, 100)));
        let spec = broker.command_spec(&with_term).unwrap();
        assert_eq!(spec.get_env("TERM"), Some("xterm-256color"));
        assert!(!spec.env_remove.contains(&"TERM".to_string()));

        let spec = broker.command_spec(&request(&["top"])).unwrap();
        assert_eq!(spec.get_env("TERM"), None);
        assert!(spec.env_remove.contains(&"TERM".to_string()));

        let empty_term = request(&["top"]).with_terminal(TerminalRequest::new("", PtySize::default()));
        assert_eq!(broker.command_spec(&empty_term).unwrap().get_env("TERM"), None);
    }

    #[test]
    fn test_command_spec_empty_default() {
        let broker = SessionBroker::new(Vec::new());
        assert!(matches!(
            broker.command_spec(&request(&[])),
            Err(LightSshdError::Command(_))
        ));
    }

    #[test]
    fn test_daemon_env_keys() {
        let keys = [
            "LIGHTSSHD_LISTEN",
            "LIGHTSSHD_LOG_LEVEL",
            "RUST_LOG",
            "HOME",
            "PATH",
            "RUST_LOG_STYLE",
            "MY_LIGHTSSHD_VAR",
        ]
        .map(String::from);

        assert_eq!(
            daemon_env_keys(keys),
            vec!["LIGHTSSHD_LISTEN", "LIGHTSSHD_LOG_LEVEL", "RUST_LOG"]
        );
    }

    #[tokio::test]
    async fn test_exec_output_and_exit_code() {
        let broker = SessionBroker::default();
        let (outcome, output) = run(&broker, request(&["echo", "hello"])).await;

        assert_eq!(output.trim_end(), "hello");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.bytes_out >= 5);
    }

    #[tokio::test]
    async fn test_default_command_used_without_exec() {
        let broker = SessionBroker::new(vec![
            "/bin/sh".into(),
            "-c".into(),
            "echo default-shell".into(),
        ]);
        let (outcome, output) = run(&broker, request(&[])).await;

        assert!(output.contains("default-shell"), "output: {output:?}");
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_nonzero_exit_code() {
        let broker = SessionBroker::default();
        let (outcome, _) = run(&broker, request(&["/bin/sh", "-c", "exit 7"])).await;
        assert_eq!(outcome.exit_code, Some(7));
    }

    #[tokio::test]
    async fn test_term_propagation() {
        let broker = SessionBroker::default();

        let req = request(&["/bin/sh", "-c", "echo term=${TERM-unset}"])
            .with_terminal(TerminalRequest::new("vt220", PtySize::default()));
        let (_, output) = run(&broker, req).await;
        assert!(output.contains("term=vt220"), "output: {output:?}");

        let req = request(&["/bin/sh", "-c", "echo term=${TERM-unset}"]);
        let (_, output) = run(&broker, req).await;
        assert!(output.contains("term=unset"), "output: {output:?}");
    }

    #[tokio::test]
    async fn test_window_size_applied() {
        let broker = SessionBroker::default();
        let req = request(&["/bin/sh", "-c", "stty size"])
            .with_terminal(TerminalRequest::new("xterm", PtySize::new(33, 111)));
        let (_, output) = run(&broker, req).await;
        assert!(output.contains("33 111"), "output: {output:?}");
    }

    #[tokio::test]
    async fn test_peer_input_reaches_command() {
        let broker = SessionBroker::default();
        let (session, mut peer) =
            session(request(&["/bin/sh", "-c", "read line; echo got:$line"]));

        peer.stdin.write_all(b"abc\n").await.unwrap();

        let (outcome, output) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(broker.handle(session), peer.read_all())
        })
        .await
        .expect("session did not finish");

        assert!(output.contains("got:abc"), "output: {output:?}");
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.bytes_in, 4);
    }

    #[tokio::test]
    async fn test_command_receives_exactly_peer_bytes() {
        // Non-canonical mode with a read timeout lets `head` see the end of
        // the peer's input as a short read, without any end-of-file sequence.
        let broker = SessionBroker::default();
        let (session, mut peer) = session(request(&[
            "/bin/sh",
            "-c",
            "stty -echo -icanon min 0 time 10; n=$(head -c 100 | wc -c); echo n=$((n))",
        ]));

        peer.stdin.write_all(b"x\n").await.unwrap();
        peer.stdin.shutdown().await.unwrap();

        let (outcome, output) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(broker.handle(session), peer.read_all())
        })
        .await
        .expect("session did not finish");

        assert!(output.contains("n=2"), "output: {output:?}");
        assert_eq!(outcome.bytes_in, 2);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_open_peer_input_does_not_hold_session() {
        // The peer never closes stdin; the session still ends with the command.
        let broker = SessionBroker::default();
        let (session, mut peer) = session(request(&["true"]));

        let outcome = tokio::time::timeout(Duration::from_secs(10), broker.handle(session))
            .await
            .expect("session did not finish");
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(peer.read_all().await, "");
    }

    #[tokio::test]
    async fn test_spawn_failure_closes_session() {
        let broker = SessionBroker::default();
        let (outcome, output) = run(&broker, request(&["/nonexistent/lightsshd-test"])).await;

        assert_eq!(outcome.exit_code, None);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_session_end_logs_user_and_address() {
        #[derive(Clone, Default)]
        struct LogBuf(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for LogBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buf = LogBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let broker = SessionBroker::default();
        run(&broker, request(&["true"])).await;

        let logs = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let ended = logs
            .lines()
            .find(|line| line.contains("session ended"))
            .expect("no session end record");
        assert!(ended.contains("user=tester"), "record: {ended}");
        assert!(ended.contains("remote_addr=127.0.0.1:2222"), "record: {ended}");
        assert!(ended.contains("exit_code=Some(0)"), "record: {ended}");
    }

    #[tokio::test]
    async fn test_peer_gone_kills_command() {
        let broker = SessionBroker::default();
        let (session, peer) = session(request(&[
            "/bin/sh",
            "-c",
            "while true; do echo spam; done",
        ]));
        drop(peer);

        let outcome = tokio::time::timeout(Duration::from_secs(10), broker.handle(session))
            .await
            .expect("session did not finish");
        assert_ne!(outcome.exit_code, Some(0));
    }
}
