//! Native PTY implementation using portable-pty.

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty};
use portable_pty::PtySize as NativePtySize;
use std::io::{Read, Write};
use tracing::debug;

use super::{CommandSpec, PtySize};
use crate::error::LightSshdError;
use crate::Result;

fn pty_err(e: impl std::fmt::Display) -> LightSshdError {
    LightSshdError::Pty(e.to_string())
}

/// Wrapper around the native PTY system.
pub struct NativePty {
    pty_system: Box<dyn portable_pty::PtySystem + Send>,
}

impl NativePty {
    /// Create a new NativePty instance.
    pub fn new() -> Self {
        Self {
            pty_system: native_pty_system(),
        }
    }

    /// Allocate a pty of the given size and start `spec` on it.
    ///
    /// The slave side is closed in this process once the child holds it, so
    /// reads from the master report end-of-stream after the child (and any
    /// descendants sharing the terminal) exit.
    pub fn spawn(&self, spec: &CommandSpec, size: PtySize) -> Result<SpawnedCommand> {
        let native_size = NativePtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = self.pty_system.openpty(native_size).map_err(pty_err)?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        for key in &spec.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| LightSshdError::Command(format!("{}: {}", spec.program, e)))?;
        drop(pair.slave);

        let pid = child.process_id();
        debug!(program = %spec.program, pid = ?pid, "spawned pty command");

        Ok(SpawnedCommand {
            master: pair.master,
            child: Some(child),
            pid,
        })
    }
}

impl Default for NativePty {
    fn default() -> Self {
        Self::new()
    }
}

/// A command running on a freshly allocated pty.
///
/// Owns the master side of the pty; dropping it closes the master
/// descriptor. If the child has not been taken by then it is killed.
pub struct SpawnedCommand {
    master: Box<dyn MasterPty + Send>,
    child: Option<Box<dyn Child + Send + Sync>>,
    pid: Option<u32>,
}

impl SpawnedCommand {
    /// Process ID of the child, if the platform reports one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Reader for the child's terminal output.
    pub fn take_reader(&self) -> Result<Box<dyn Read + Send>> {
        self.master.try_clone_reader().map_err(pty_err)
    }

    /// Writer for the child's terminal input (can only be called once).
    pub fn take_writer(&self) -> Result<Box<dyn Write + Send>> {
        self.master.take_writer().map_err(pty_err)
    }

    /// Handle that can kill the child from another thread.
    pub fn killer(&self) -> Option<Box<dyn ChildKiller + Send + Sync>> {
        self.child.as_ref().map(|child| child.clone_killer())
    }

    /// Take ownership of the child to wait on it.
    pub fn take_child(&mut self) -> Option<Box<dyn Child + Send + Sync>> {
        self.child.take()
    }
}

impl Drop for SpawnedCommand {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                debug!(pid = ?self.pid, "killing orphaned pty command");
                let _ = child.kill();
                let _ = child.try_wait();
            }
        }
    }
}
