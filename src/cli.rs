//! Command-line interface for lightsshd.
//!
//! Flags are parsed with lexopt; every flag is optional and only overrides
//! what the config file and environment already set.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Every value is optional so that the config layer can tell an explicit
/// flag apart from a default.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: Option<String>,
    /// Address to listen on (`host:port`).
    pub listen: Option<String>,
    /// PID file path.
    pub pid_file: Option<PathBuf>,
    /// Host private key path.
    pub host_key: Option<PathBuf>,
    /// Authorized keys file path.
    pub authorized_keys: Option<PathBuf>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Short('L') | Long("listen") => {
                let value: String = parser.value()?.parse()?;
                if !looks_like_socket_addr(&value) {
                    return Err(ArgsError::InvalidValue("listen", value));
                }
                result.listen = Some(value);
            }
            Short('P') | Long("pid-file") => {
                result.pid_file = Some(parser.value()?.parse()?);
            }
            Short('k') | Long("host-key") => {
                result.host_key = Some(parser.value()?.parse()?);
            }
            Short('a') | Long("authorized-keys") => {
                result.authorized_keys = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// `host:port` with a numeric port. The host part is resolved at bind time.
fn looks_like_socket_addr(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"lightsshd {version}
Lightweight SSH daemon

USAGE:
    lightsshd [OPTIONS]

OPTIONS:
    -l, --log-level <LVL>         Log level (trace, debug, info, warn, error) [default: error]
    -L, --listen <ADDR>           Address to listen on [default: 0.0.0.0:2222]
    -P, --pid-file <FILE>         PID file path
    -k, --host-key <FILE>         Host key file path [default: /etc/lightsshd/ssh_host_ed25519_key]
    -a, --authorized-keys <FILE>  Authorized keys file path [default: /etc/lightsshd/authorized_keys]
    -c, --config <FILE>           Path to configuration file (JSON)
    -h, --help                    Print help
    -V, --version                 Print version

ENVIRONMENT VARIABLES:
    LIGHTSSHD_LISTEN              Listen address (overrides config)
    LIGHTSSHD_HOST_KEY            Host key path (overrides config)
    LIGHTSSHD_AUTHORIZED_KEYS     Authorized keys path (overrides config)
    LIGHTSSHD_PID_FILE            PID file path (overrides config)
    LIGHTSSHD_LOG_LEVEL           Log level (overrides config)
    RUST_LOG                      Alternative log level setting

EXAMPLES:
    # Start with defaults (0.0.0.0:2222, keys under /etc/lightsshd)
    lightsshd

    # Local test instance
    lightsshd -L 127.0.0.1:2022 -k ./host_key -a ~/.ssh/authorized_keys -l debug

    # Run as a service with a PID file
    lightsshd -P /run/lightsshd.pid
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("lightsshd {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
