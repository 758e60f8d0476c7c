//! # Configuration Management
//!
//! Centralized configuration for the packet layer.
//!
//! This module provides structured configuration for the packet processor,
//! the matcher that issues connect tokens, the UDP transport and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`SECURE_PACKET_*`)
//!
//! ## Security Considerations
//! - The matcher nonce file must survive restarts whenever the matcher's
//!   private key does; without it a restarted matcher reuses nonces
//! - Short token expiry limits the window for a leaked token

use crate::error::{ProtocolError, Result};
use crate::protocol::token::MAX_SERVERS_PER_CONNECT_TOKEN;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default protocol id stamped into every packet and token
pub const DEFAULT_PROTOCOL_ID: u32 = 0x1234_1651;

/// Default maximum serialized packet size
pub const DEFAULT_MAX_PACKET_SIZE: usize = 4096;

/// Smallest accepted `max_packet_size`
pub const MIN_MAX_PACKET_SIZE: usize = 16;

/// Largest accepted `max_packet_size`
pub const MAX_MAX_PACKET_SIZE: usize = 65_535;

/// Default number of nonces leased per persisted block
pub const DEFAULT_NONCE_RESERVATION: u64 = 1024;

/// Whether transports encrypt by default
pub const ENABLE_ENCRYPTION: bool = true;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Packet processor configuration
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Matcher configuration
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    ///
    /// Unparseable values are reported rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = env_parse::<u32>("SECURE_PACKET_PROTOCOL_ID")? {
            config.processor.protocol_id = val;
        }

        if let Some(val) = env_parse::<usize>("SECURE_PACKET_MAX_PACKET_SIZE")? {
            config.processor.max_packet_size = val;
        }

        if let Ok(servers) = std::env::var("SECURE_PACKET_SERVER_ADDRESSES") {
            config.matcher.server_addresses = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(val) = env_parse::<u64>("SECURE_PACKET_TOKEN_EXPIRY_MS")? {
            config.matcher.token_expiry = Duration::from_millis(val);
        }

        if let Ok(path) = std::env::var("SECURE_PACKET_NONCE_FILE") {
            config.matcher.nonce_file = Some(path);
        }

        if let Ok(addr) = std::env::var("SECURE_PACKET_BIND_ADDRESS") {
            config.transport.bind_address = addr;
        }

        if let Some(val) = env_parse::<bool>("SECURE_PACKET_ENCRYPTION_ENABLED")? {
            config.transport.encryption_enabled = val;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.processor.validate());
        errors.extend(self.matcher.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Packet processor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessorConfig {
    /// Protocol id embedded in every packet; readers reject other ids
    pub protocol_id: u32,

    /// Largest serialized packet; rounded up to a multiple of 4
    pub max_packet_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            protocol_id: DEFAULT_PROTOCOL_ID,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

impl ProcessorConfig {
    /// Validate processor configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_packet_size < MIN_MAX_PACKET_SIZE {
            errors.push(format!(
                "Max packet size too small: {} bytes (minimum: {MIN_MAX_PACKET_SIZE})",
                self.max_packet_size
            ));
        } else if self.max_packet_size > MAX_MAX_PACKET_SIZE {
            errors.push(format!(
                "Max packet size too large: {} bytes (maximum: {MAX_MAX_PACKET_SIZE})",
                self.max_packet_size
            ));
        }

        errors
    }
}

/// Matcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatcherConfig {
    /// Dedicated servers registered at startup (e.g., "127.0.0.1:40000")
    pub server_addresses: Vec<String>,

    /// Lifetime of an issued connect token
    #[serde(with = "duration_serde")]
    pub token_expiry: Duration,

    /// Servers listed per token, first entry preferred
    pub max_servers_per_token: usize,

    /// File holding the nonce high-water mark; `None` keeps it in memory
    #[serde(default)]
    pub nonce_file: Option<String>,

    /// Nonces leased per write of the nonce file
    pub nonce_reservation: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            server_addresses: vec![String::from("127.0.0.1:40000")],
            token_expiry: Duration::from_secs(30),
            max_servers_per_token: 1,
            nonce_file: None,
            nonce_reservation: DEFAULT_NONCE_RESERVATION,
        }
    }
}

impl MatcherConfig {
    /// Parsed server addresses
    pub fn parsed_server_addresses(&self) -> Result<Vec<SocketAddr>> {
        self.server_addresses
            .iter()
            .map(|addr| {
                addr.parse::<SocketAddr>().map_err(|_| {
                    ProtocolError::ConfigError(format!("Invalid server address: '{addr}'"))
                })
            })
            .collect()
    }

    /// Validate matcher configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.server_addresses.is_empty() {
            errors.push("Matcher needs at least one server address".to_string());
        }
        for addr in &self.server_addresses {
            if addr.parse::<SocketAddr>().is_err() {
                errors.push(format!(
                    "Invalid server address format: '{addr}' (expected format: '127.0.0.1:40000')"
                ));
            }
        }

        if self.token_expiry.as_secs() < 1 {
            errors.push("Token expiry too short (minimum: 1s)".to_string());
        } else if self.token_expiry.as_secs() > 3600 {
            errors.push("Token expiry too long (maximum: 1 hour)".to_string());
        }

        if self.max_servers_per_token == 0 {
            errors.push("Max servers per token must be greater than 0".to_string());
        } else if self.max_servers_per_token > MAX_SERVERS_PER_CONNECT_TOKEN {
            errors.push(format!(
                "Max servers per token too large: {} (maximum: {MAX_SERVERS_PER_CONNECT_TOKEN})",
                self.max_servers_per_token
            ));
        }

        if self.nonce_reservation == 0 {
            errors.push("Nonce reservation must be greater than 0".to_string());
        }

        if let Some(ref path) = self.nonce_file {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    errors.push(format!(
                        "Nonce file directory does not exist: {}",
                        parent.display()
                    ));
                }
            }
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// UDP bind address (e.g., "0.0.0.0:40000")
    pub bind_address: String,

    /// Whether to encrypt packet types the policy allows
    pub encryption_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("127.0.0.1:40000"),
            encryption_enabled: ENABLE_ENCRYPTION,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.bind_address.is_empty() {
            errors.push("Bind address cannot be empty".to_string());
        } else if self.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid bind address format: '{}' (expected format: '0.0.0.0:40000')",
                self.bind_address
            ));
        }

        if !self.encryption_enabled {
            errors.push(
                "WARNING: Encryption is disabled - not recommended for production".to_string(),
            );
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("secure-packet"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
