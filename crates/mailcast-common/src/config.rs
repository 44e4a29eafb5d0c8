//! Configuration for Mailcast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "MAILCAST";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration
    #[serde(default)]
    pub app: AppConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound SMTP servers, in configuration order
    #[serde(default)]
    pub smtp: Vec<SmtpServerConfig>,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sender used when a campaign does not set one
    #[serde(default = "default_from_email")]
    pub from_email: String,

    /// Interval between running-campaign rate reports
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            from_email: default_from_email(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

fn default_from_email() -> String {
    "Mailcast <noreply@localhost>".to_string()
}

fn default_stats_interval() -> u64 {
    60
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a free connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// One outbound SMTP server descriptor.
///
/// `auth_protocol` and `email_format` are kept as raw strings here; the
/// messenger resolves them when it is built so that an unknown value fails
/// messenger construction rather than config loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpServerConfig {
    /// Unique server name
    pub name: String,

    /// Disabled servers are ignored when the messenger is built
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// "", "none", "cram", "plain" or "login"
    #[serde(default)]
    pub auth_protocol: String,

    /// "html", "plain" or "" (both)
    #[serde(default)]
    pub email_format: String,

    #[serde(default)]
    pub tls_enabled: bool,

    #[serde(default)]
    pub tls_skip_verify: bool,

    /// Headers added to every message sent through this server, as "Key: Value"
    #[serde(default)]
    pub inject_headers: Vec<String>,

    /// Maximum pooled connections
    #[serde(default = "default_max_conns")]
    pub max_conns: u32,

    /// Idle time before a pooled connection is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Timeout for a single SMTP command
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,

    /// Name announced in EHLO/HELO
    #[serde(default)]
    pub hello_hostname: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_smtp_port() -> u16 {
    25
}

fn default_max_conns() -> u32 {
    10
}

fn default_idle_timeout() -> u64 {
    15
}

fn default_wait_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from a file, with `MAILCAST__*` environment overrides
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the given path, or from the default locations
    pub fn load(path: Option<PathBuf>) -> crate::Result<Self> {
        if let Some(path) = path {
            return Self::from_file(&path);
        }

        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/mailcast/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }

    /// SMTP servers that are switched on
    pub fn enabled_smtp_servers(&self) -> Vec<SmtpServerConfig> {
        self.smtp.iter().filter(|s| s.enabled).cloned().collect()
    }
}
