//! # lightsshd
//!
//! A minimal SSH daemon: public-key authentication against an
//! `authorized_keys` file, and one pty-backed command per session.
//!
//! ## Features
//!
//! - **Zero setup**: the Ed25519 host key is generated on first start
//! - **Live key list**: `authorized_keys` is re-read on every login attempt
//! - **Pty sessions**: shell or exec requests run on a pseudo-terminal with
//!   the client's terminal type and window size
//!
//! ## Quick Start
//!
//! ```no_run
//! use lightsshd::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> lightsshd::Result<()> {
//!     let mut config = Config::default();
//!     config.server.listen = "127.0.0.1:2222".into();
//!     config.auth.host_key = "./ssh_host_ed25519_key".into();
//!     config.auth.authorized_keys = "./authorized_keys".into();
//!
//!     lightsshd::logging::try_init("info").ok();
//!     lightsshd::daemon::run(&config).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod pty;
pub mod security;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use error::{LightSshdError, Result};
pub use pty::{CommandSpec, NativePty, PtySize};
pub use security::{AuthorizedKeySet, HostIdentity};
pub use session::{SessionBroker, SessionOutcome, SessionRequest, ShellSession};
