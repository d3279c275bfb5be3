//! Configuration management for session-hub.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api::ServerConfig;
use crate::cli::Args;
use crate::credentials::DEFAULT_INLINE_LIMIT;
use crate::driver::ProcessDriverFactory;
use crate::hub::HubConfig;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Pairing configuration.
    pub pairing: PairingSection,
    /// Credential storage configuration.
    pub storage: StorageSection,
    /// Driver process configuration.
    pub driver: DriverSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            graceful_shutdown: true,
        }
    }
}

/// Pairing configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingSection {
    /// QR codes a session may issue before it is destroyed. No default.
    pub max_qr_attempts: Option<u32>,
}

/// Credential storage section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory holding one subdirectory per session.
    pub root: PathBuf,
    /// Files below this many bytes are inlined in snapshots.
    pub inline_limit: u64,
    /// Restore persisted credentials before a driver starts.
    pub restore: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./sessions"),
            inline_limit: DEFAULT_INLINE_LIMIT,
            restore: true,
        }
    }
}

/// Driver process section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSection {
    /// Executable started once per session.
    pub command: Option<String>,
    /// Extra arguments for the executable.
    pub args: Vec<String>,
    /// Parent of the per-session working credential directories.
    pub auth_root: PathBuf,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            auth_root: PathBuf::from("./.driver_auth"),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
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
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("SESSION_HUB_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("SESSION_HUB_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(value) = std::env::var("SESSION_HUB_MAX_QR_ATTEMPTS") {
            let attempts = value
                .parse()
                .map_err(|_| ConfigError::InvalidAttempts(value.clone()))?;
            self.pairing.max_qr_attempts = Some(attempts);
        }

        if let Ok(root) = std::env::var("SESSION_HUB_STORE") {
            self.storage.root = PathBuf::from(root);
        }

        if let Ok(command) = std::env::var("SESSION_HUB_DRIVER") {
            if !command.is_empty() {
                self.driver.command = Some(command);
            }
        }

        if let Ok(level) = std::env::var("SESSION_HUB_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(attempts) = args.max_qr_attempts {
            self.pairing.max_qr_attempts = Some(attempts);
        }
        if let Some(ref root) = args.store {
            self.storage.root = root.clone();
        }
        if let Some(ref command) = args.driver {
            self.driver.command = Some(command.clone());
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

        config.apply_env()?;
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Check the values that have no usable default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.pairing.max_qr_attempts {
            None => Err(ConfigError::MissingAttempts),
            Some(0) => Err(ConfigError::InvalidAttempts("0".to_string())),
            Some(_) => Ok(()),
        }
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port);
        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }

        Ok(server_config)
    }

    /// Convert to the settings the session hub runs with.
    pub fn to_hub_config(&self) -> Result<HubConfig, ConfigError> {
        self.validate()?;
        let max_qr_attempts = self
            .pairing
            .max_qr_attempts
            .ok_or(ConfigError::MissingAttempts)?;

        Ok(HubConfig {
            max_qr_attempts,
            store_root: self.storage.root.clone(),
            inline_limit: self.storage.inline_limit,
            restore_credentials: self.storage.restore,
        })
    }

    /// Build the factory that starts one driver process per session.
    pub fn driver_factory(&self) -> Result<ProcessDriverFactory, ConfigError> {
        let command = self
            .driver
            .command
            .clone()
            .ok_or(ConfigError::MissingDriver)?;
        Ok(ProcessDriverFactory::new(
            command,
            self.driver.args.clone(),
            self.driver.auth_root.clone(),
        ))
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
    /// Invalid host address.
    InvalidHost(String),
    /// `pairing.max_qr_attempts` was not given anywhere.
    MissingAttempts,
    /// `pairing.max_qr_attempts` is not a positive integer.
    InvalidAttempts(String),
    /// `driver.command` was not given anywhere.
    MissingDriver,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
            Self::MissingAttempts => write!(
                f,
                "max QR attempts not configured (pairing.max_qr_attempts, \
                 SESSION_HUB_MAX_QR_ATTEMPTS or --max-qr-attempts)"
            ),
            Self::InvalidAttempts(value) => {
                write!(f, "max QR attempts must be a positive integer, got '{}'", value)
            }
            Self::MissingDriver => write!(
                f,
                "driver command not configured (driver.command, SESSION_HUB_DRIVER or --driver)"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
