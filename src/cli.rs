//! CLI argument parsing for jmx-bridge
//!
//! # Options
//!
//! - `--config` / `-c`: Configuration file path (default: config.yaml, env: JMX_BRIDGE_CONFIG)
//! - `--port` / `-p`: Server port (env: JMX_BRIDGE_PORT)
//! - `--bind-address`: Server bind address (env: JMX_BRIDGE_BIND_ADDRESS)
//! - `--metrics-path`: Metrics endpoint path (env: JMX_BRIDGE_METRICS_PATH)
//! - `--jolokia-url`: Remote Jolokia agent URL (env: JMX_BRIDGE_JOLOKIA_URL)
//! - `--timeout-ms`: Remote request timeout (env: JMX_BRIDGE_TIMEOUT_MS)
//! - `--username` / `--password`: Remote agent credentials
//! - `--validate`: Validate configuration without starting server
//! - `--dry-run`: Scrape once and print the result
//! - `--log-level` / `-l`: Log level (env: JMX_BRIDGE_LOG_LEVEL)
//! - `--output-format`: Output format for validate/dry-run (text/json/yaml)
//!
//! # Precedence
//!
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;

/// jmx-bridge - rule-based JMX to Prometheus exporter
///
/// Scrapes JMX beans from the local registry or a remote Jolokia agent and
/// exports them in Prometheus format.
#[derive(Parser, Debug)]
#[command(name = "jmx-bridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.yaml",
        env = "JMX_BRIDGE_CONFIG"
    )]
    pub config: PathBuf,

    /// Server port (overrides config file)
    #[arg(short, long, value_name = "PORT", env = "JMX_BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Server bind address (overrides config file)
    /// Supported values: IP addresses (0.0.0.0, 127.0.0.1, ::1) or "localhost"
    #[arg(long, value_name = "ADDRESS", env = "JMX_BRIDGE_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Metrics endpoint path (overrides config file)
    #[arg(long, value_name = "PATH", env = "JMX_BRIDGE_METRICS_PATH")]
    pub metrics_path: Option<String>,

    /// Remote Jolokia agent URL (overrides config file)
    #[arg(long, value_name = "URL", env = "JMX_BRIDGE_JOLOKIA_URL")]
    pub jolokia_url: Option<String>,

    /// Remote request timeout in milliseconds (overrides config file)
    #[arg(long, value_name = "MS", env = "JMX_BRIDGE_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Remote agent username (overrides config file)
    #[arg(long, value_name = "USERNAME", env = "JMX_BRIDGE_USERNAME")]
    pub username: Option<String>,

    /// Remote agent password (overrides config file)
    #[arg(long, value_name = "PASSWORD", env = "JMX_BRIDGE_PASSWORD")]
    pub password: Option<String>,

    /// Validate configuration without starting server
    #[arg(long)]
    pub validate: bool,

    /// Scrape once, print the metrics and exit
    #[arg(long, conflicts_with = "validate")]
    pub dry_run: bool,

    /// Log level
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        env = "JMX_BRIDGE_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, env = "JMX_BRIDGE_LOG_JSON")]
    pub log_json: bool,

    /// Output format for --validate and --dry-run
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind_address) = &self.bind_address {
            config.server.bind_address = bind_address.clone();
        }
        if let Some(path) = &self.metrics_path {
            config.server.path = path.clone();
        }
        if let Some(url) = &self.jolokia_url {
            config.jolokia_url = Some(url.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
    }
}

/// Log level options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Output format options for validate and dry-run modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}
