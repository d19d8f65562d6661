//! Security module for lightsshd.
//!
//! - **Host identity**: provisions the daemon's long-term Ed25519 key
//! - **Authorized keys**: decides which client public keys may log in
//!
//! ## Example
//!
//! ```no_run
//! use lightsshd::security::{AuthorizedKeySet, HostIdentity};
//!
//! # fn main() -> lightsshd::Result<()> {
//! let identity = HostIdentity::new("/etc/lightsshd/ssh_host_ed25519_key");
//! identity.ensure()?;
//!
//! let keys = AuthorizedKeySet::new("/etc/lightsshd/authorized_keys");
//! println!("{} keys authorized", keys.load()?.len());
//! # Ok(())
//! # }
//! ```

pub mod authorized_keys;
pub mod host_key;

pub use authorized_keys::{AuthorizedKeyEntry, AuthorizedKeySet};
pub use host_key::{public_key_path, HostIdentity, Provisioned};
