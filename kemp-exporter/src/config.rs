//! Configuration for the exporter.
//!
//! Settings come from an optional JSON5 file and the `server` subcommand's
//! flags. Flags given on the command line win over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use kemp_client::Credentials;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Log filter used when `--debug` is given.
pub const DEBUG_LOG_FILTER: &str = "info,kemp_exporter=debug,kemp_client=debug";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Export KEMP LoadMaster statistics as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "kemp-exporter")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Server(ServerArgs),
}

/// Arguments of the `server` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on [default: 8000]
    #[arg(long)]
    pub port: Option<u16>,

    /// Time (in seconds) between accessing the LoadMaster API [default: 10]
    #[arg(long)]
    pub wait: Option<u64>,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Accept invalid TLS certificates from the appliance
    #[arg(long)]
    pub insecure: bool,

    /// Path to configuration file (JSON5 format)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// LoadMaster API endpoint (URL or host)
    pub endpoint: String,

    /// API username
    pub username: String,

    /// API password
    pub password: String,
}

impl ServerArgs {
    /// Build the effective configuration and appliance credentials.
    pub fn resolve(&self) -> Result<(ExporterConfig, Credentials), ConfigError> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::load_from_file(path)?,
            None => ExporterConfig::default(),
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(wait) = self.wait {
            config.collector.wait_secs = wait;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if self.debug {
            config.logging.level = DEBUG_LOG_FILTER.to_string();
        }

        config.validate()?;

        let credentials = Credentials {
            endpoint: self.endpoint.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            debug: self.debug,
            insecure: self.insecure,
        };

        Ok((config, credentials))
    }
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Polling settings.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Metric naming settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on, on all interfaces (default: 8000).
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Collector loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Delay between the end of one fetch and the start of the next (seconds).
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
}

fn default_wait_secs() -> u64 {
    10
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            wait_secs: default_wait_secs(),
        }
    }
}

impl CollectorConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

/// Prometheus naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Metric name prefix (default: "kemp").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "kemp".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector.wait_secs == 0 {
            return Err(ConfigError::Validation(
                "wait_secs must be > 0".to_string(),
            ));
        }

        let prefix = &self.prometheus.prefix;
        if prefix.is_empty() {
            return Err(ConfigError::Validation(
                "prefix must not be empty".to_string(),
            ));
        }

        let valid_start = prefix
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Validation(format!(
                "Invalid metric prefix: {}",
                prefix
            )));
        }

        Ok(())
    }
}
