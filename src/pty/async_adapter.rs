//! Async adapters for PTY I/O.
//!
//! The pty master only offers blocking `Read`/`Write` halves. These adapters
//! run them on tokio's blocking pool and exchange data with async code over
//! bounded channels.

use std::io::{Read, Write};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Default chunk size for pty reads.
const READ_BUFFER_SIZE: usize = 4096;

/// Returns true for read errors that just mean "the terminal is gone".
fn is_hangup(e: &std::io::Error) -> bool {
    // EIO on Unix means every slave descriptor was closed
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EIO) {
        return true;
    }
    e.kind() == std::io::ErrorKind::BrokenPipe
}

/// Pumps pty output into a channel.
pub struct AsyncPtyReader<R: Read + Send + 'static> {
    reader: R,
    tx: mpsc::Sender<Vec<u8>>,
    buffer_size: usize,
}

impl<R: Read + Send + 'static> AsyncPtyReader<R> {
    /// Create a reader that forwards chunks read from `reader` to `tx`.
    pub fn new(reader: R, tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            reader,
            tx,
            buffer_size: READ_BUFFER_SIZE,
        }
    }

    /// Create with custom buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Read until end-of-stream, hangup, or the receiver goes away.
    ///
    /// Returns the number of bytes forwarded. The sender is dropped on
    /// return, which is what signals end-of-stream to the receiver.
    pub async fn run(self) -> u64 {
        let buffer_size = self.buffer_size;
        let mut reader = self.reader;
        let tx = self.tx;

        let result = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; buffer_size];
            let mut total = 0u64;

            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!("pty reader: EOF");
                        break;
                    }
                    Ok(n) => {
                        trace!(bytes = n, "pty reader: chunk");
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            debug!("pty reader: receiver dropped");
                            break;
                        }
                        total += n as u64;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) if is_hangup(&e) => {
                        debug!("pty reader: terminal closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "pty read failed");
                        break;
                    }
                }
            }
            total
        })
        .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "pty reader task panicked");
            0
        })
    }
}

/// Drains a channel into pty input.
pub struct AsyncPtyWriter<W: Write + Send + 'static> {
    writer: W,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl<W: Write + Send + 'static> AsyncPtyWriter<W> {
    /// Create a writer that copies chunks received on `rx` into `writer`.
    pub fn new(writer: W, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { writer, rx }
    }

    /// Write until every sender is dropped or the pty rejects input.
    ///
    /// Returns the number of bytes written and the writer itself. The
    /// writer is handed back rather than dropped: dropping a pty master
    /// writer sends end-of-file to the terminal, so the caller decides when
    /// that may happen. `None` means the blocking task panicked.
    pub async fn run(self) -> (u64, Option<W>) {
        let mut writer = self.writer;
        let mut rx = self.rx;

        let result = tokio::task::spawn_blocking(move || {
            let mut total = 0u64;
            while let Some(data) = rx.blocking_recv() {
                trace!(bytes = data.len(), "pty writer: chunk");
                if let Err(e) = writer.write_all(&data).and_then(|()| writer.flush()) {
                    if is_hangup(&e) {
                        debug!("pty writer: terminal closed");
                    } else {
                        warn!(error = %e, "pty write failed");
                    }
                    break;
                }
                total += data.len() as u64;
            }
            debug!("pty writer: done");
            (total, writer)
        })
        .await;

        match result {
            Ok((total, writer)) => (total, Some(writer)),
            Err(e) => {
                warn!(error = %e, "pty writer task panicked");
                (0, None)
            }
        }
    }
}
