//! Configuration management for lightsshd.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::Args;

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:2222";

/// Default host private key path.
pub const DEFAULT_HOST_KEY: &str = "/etc/lightsshd/ssh_host_ed25519_key";

/// Default authorized keys path.
pub const DEFAULT_AUTHORIZED_KEYS: &str = "/etc/lightsshd/authorized_keys";

/// Default command for sessions that do not request one.
pub const DEFAULT_COMMAND: &str = "/bin/bash";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener and session settings.
    pub server: ServerSection,
    /// Key file locations.
    pub auth: AuthSection,
    /// Logging configuration.
    pub logging: LoggingSection,
    /// Optional PID file.
    pub pid_file: Option<PathBuf>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to listen on (`host:port`).
    pub listen: String,
    /// Command run for sessions without an explicit command.
    pub default_command: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            default_command: vec![DEFAULT_COMMAND.to_string()],
        }
    }
}

/// Key file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Host private key path; the public key lives next to it with `.pub`.
    pub host_key: PathBuf,
    /// Authorized keys file.
    pub authorized_keys: PathBuf,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            host_key: PathBuf::from(DEFAULT_HOST_KEY),
            authorized_keys: PathBuf::from(DEFAULT_AUTHORIZED_KEYS),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: crate::logging::DEFAULT_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source (for testing).
    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(listen) = var("LIGHTSSHD_LISTEN") {
            self.server.listen = listen;
        }

        if let Some(path) = var("LIGHTSSHD_HOST_KEY") {
            self.auth.host_key = PathBuf::from(path);
        }

        if let Some(path) = var("LIGHTSSHD_AUTHORIZED_KEYS") {
            self.auth.authorized_keys = PathBuf::from(path);
        }

        if let Some(path) = var("LIGHTSSHD_PID_FILE") {
            self.pid_file = Some(PathBuf::from(path));
        }

        if let Some(level) = var("LIGHTSSHD_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref listen) = args.listen {
            self.server.listen = listen.clone();
        }

        if let Some(ref path) = args.host_key {
            self.auth.host_key = path.clone();
        }

        if let Some(ref path) = args.authorized_keys {
            self.auth.authorized_keys = path.clone();
        }

        if let Some(ref path) = args.pid_file {
            self.pid_file = Some(path.clone());
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject configurations that cannot start a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .default_command
            .first()
            .map_or(true, |program| program.is_empty())
        {
            return Err(ConfigError::EmptyDefaultCommand);
        }
        Ok(())
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// `server.default_command` has no program.
    EmptyDefaultCommand,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::EmptyDefaultCommand => write!(f, "server.default_command must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::LightSshdError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
