//! Configuration management for wa-gateway.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::{ServerConfig, UploadConfig, DEFAULT_MAX_FILE_BYTES};
use crate::cli::Args;
use crate::session::{CredentialStore, RecoveryPolicy, DEFAULT_CREDENTIALS_DIR};
use crate::transport::{BridgeConfig, DEFAULT_BRIDGE_PROGRAM};

const HOST_VARS: &[&str] = &["WA_GATEWAY_HOST", "IP", "NODEJS_IP"];
const PORT_VARS: &[&str] = &["WA_GATEWAY_PORT", "PORT", "NODEJS_PORT"];
const LOG_VARS: &[&str] = &["WA_GATEWAY_LOG_LEVEL", "RUST_LOG"];

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerSection,
    /// Session recovery configuration.
    pub session: SessionSection,
    /// Bridge transport configuration.
    pub transport: TransportSection,
    /// Upload staging configuration.
    pub uploads: UploadsSection,
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

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Delay before reconnecting after a failure, in milliseconds.
    pub retry_delay_ms: u64,
    /// Delay before reconnecting after a manual reset, in milliseconds.
    pub reset_delay_ms: u64,
    /// Consecutive failures tolerated. Absent means unbounded.
    pub max_retries: Option<u32>,
    /// Where the transport keeps its login state.
    pub credentials_dir: PathBuf,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            retry_delay_ms: 2000,
            reset_delay_ms: 1000,
            max_retries: None,
            credentials_dir: PathBuf::from(DEFAULT_CREDENTIALS_DIR),
        }
    }
}

/// Transport configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Bridge program.
    pub command: String,
    /// Bridge arguments.
    pub args: Vec<String>,
    /// Per-send limit in seconds. Zero waits forever.
    pub send_timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            command: DEFAULT_BRIDGE_PROGRAM.to_string(),
            args: Vec::new(),
            send_timeout_secs: 60,
        }
    }
}

/// Uploads configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsSection {
    /// Staging directory for uploaded files.
    pub dir: PathBuf,
    /// Per-file size ceiling in bytes.
    pub max_file_bytes: usize,
}

impl Default for UploadsSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level or filter directive.
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
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its
    /// value. Earlier names in each group win over later ones.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
        };

        if let Some(host) = first(HOST_VARS) {
            self.server.host = host;
        }

        if let Some(port) = first(PORT_VARS) {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
        }

        if let Some(level) = first(LOG_VARS) {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref host) = args.host {
            self.server.host = host.clone();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref command) = args.bridge {
            self.transport.command = command.clone();
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

        Ok(config)
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host = resolve_host(&self.server.host, self.server.port)?;

        let mut server_config = ServerConfig::new(host, self.server.port);
        server_config.graceful_shutdown = self.server.graceful_shutdown;

        Ok(server_config)
    }

    /// Recovery timings for the session manager.
    pub fn recovery_policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            retry_delay: Duration::from_millis(self.session.retry_delay_ms),
            reset_delay: Duration::from_millis(self.session.reset_delay_ms),
            max_retries: self.session.max_retries,
        }
    }

    pub fn credential_store(&self) -> CredentialStore {
        CredentialStore::new(&self.session.credentials_dir)
    }

    /// How to launch the bridge process.
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            program: self.transport.command.clone(),
            args: self.transport.args.clone(),
            session_dir: self.session.credentials_dir.clone(),
        }
    }

    /// Limit on each transport send, `None` when disabled.
    pub fn send_timeout(&self) -> Option<Duration> {
        match self.transport.send_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig::new(&self.uploads.dir).with_max_file_bytes(self.uploads.max_file_bytes)
    }

    /// Get the log level filter string.
    ///
    /// A bare level applies to this crate only; anything else is passed
    /// through as a filter directive.
    pub fn log_filter(&self) -> String {
        let level = self.logging.level.trim();
        match level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {
                format!("wa_gateway={}", level.to_ascii_lowercase())
            }
            _ => level.to_string(),
        }
    }
}

/// Turn a literal address or a host name into the address to bind.
fn resolve_host(host: &str, port: u16) -> Result<IpAddr, ConfigError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip())
        .ok_or_else(|| ConfigError::InvalidHost(host.to_string()))
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Host that is neither an address nor a resolvable name.
    InvalidHost(String),
    /// Invalid port number.
    InvalidPort(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "cannot resolve host: {}", host),
            Self::InvalidPort(port) => write!(f, "invalid port: {}", port),
        }
    }
}

impl std::error::Error for ConfigError {}
