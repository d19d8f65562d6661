//! Session handling.
//!
//! A session is one accepted, authenticated SSH channel. [`SessionRequest`]
//! captures what the peer asked for; [`SessionBroker`] runs the command on a
//! pty and copies bytes in both directions until the command's output ends.

mod broker;
mod id;
mod request;

pub use broker::{SessionBroker, SessionOutcome};
pub use id::SessionId;
pub use request::{split_command, SessionRequest, ShellSession, TerminalRequest};
