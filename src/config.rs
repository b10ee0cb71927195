//! Configuration management for jmx-bridge
//!
//! Handles loading and validating configuration from YAML files. Keys are
//! camelCase; `whitelistObjectNames`/`blacklistObjectNames` are accepted as
//! aliases of the include/exclude lists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::collector::{ObjectName, ObjectNamePattern};
use crate::error::RuleError;
use crate::scraper::AttributeFilter;
use crate::transformer::{RuleConfig, RuleSet};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Rule set rejected
    #[error("Invalid rule: {0}")]
    RuleError(#[from] RuleError),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote Jolokia agent. Absent means the in-process bean server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jolokia_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Require TLS towards the remote agent
    #[serde(default)]
    pub ssl: bool,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Scrapes are refused for this long after start
    #[serde(default)]
    pub start_delay_seconds: u64,

    #[serde(default)]
    pub lowercase_output_name: bool,

    #[serde(default)]
    pub lowercase_output_label_names: bool,

    /// Bean name patterns to scrape. Empty means every bean.
    #[serde(default, alias = "whitelistObjectNames")]
    pub include_object_names: Vec<String>,

    /// Bean name patterns to skip
    #[serde(default, alias = "blacklistObjectNames")]
    pub exclude_object_names: Vec<String>,

    /// Attributes always fetched, per bean
    #[serde(default)]
    pub include_object_name_attributes: BTreeMap<String, Vec<String>>,

    /// Attributes never fetched, per bean
    #[serde(default)]
    pub exclude_object_name_attributes: BTreeMap<String, Vec<String>>,

    /// Learn exclusions for attributes with unsupported values
    #[serde(default = "default_true")]
    pub auto_exclude_object_name_attributes: bool,

    /// Metric transformation rules
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

// Default value functions
fn default_timeout() -> u64 {
    5000
}

fn default_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            path: default_metrics_path(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            jolokia_url: None,
            username: None,
            password: None,
            ssl: false,
            timeout_ms: default_timeout(),
            start_delay_seconds: 0,
            lowercase_output_name: false,
            lowercase_output_label_names: false,
            include_object_names: Vec::new(),
            exclude_object_names: Vec::new(),
            include_object_name_attributes: BTreeMap::new(),
            exclude_object_name_attributes: BTreeMap::new(),
            auto_exclude_object_name_attributes: true,
            rules: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    /// Use `Config::load_or_default()` for an optional file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        // An empty document is a valid, all-default configuration.
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, falling back to defaults if not found
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load(path)
    }

    /// Validate the configuration
    ///
    /// Rule regexes are checked too, so a configuration that validates can
    /// always be compiled into a rule set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if !self.server.path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "Metrics path must start with '/'".to_string(),
            ));
        }

        if self.server.path == "/" || self.server.path == "/health" {
            return Err(ConfigError::ValidationError(format!(
                "Metrics path '{}' conflicts with a built-in endpoint",
                self.server.path
            )));
        }

        self.validate_connection()?;
        self.include_patterns()?;
        self.exclude_patterns()?;
        self.attribute_filter()?;
        self.rule_set()?;

        Ok(())
    }

    fn validate_connection(&self) -> Result<(), ConfigError> {
        let Some(url) = self.remote_url() else {
            if self.username.is_some() || self.password.is_some() {
                return Err(ConfigError::ValidationError(
                    "username/password require jolokiaUrl".to_string(),
                ));
            }
            if self.ssl {
                return Err(ConfigError::ValidationError(
                    "ssl requires jolokiaUrl".to_string(),
                ));
            }
            return Ok(());
        };

        let parsed = url::Url::parse(url).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid jolokiaUrl '{}': {}", url, e))
        })?;
        if self.ssl && parsed.scheme() != "https" {
            return Err(ConfigError::ValidationError(format!(
                "ssl is enabled but jolokiaUrl '{}' is not https",
                url
            )));
        }

        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::ValidationError(
                "username and password must be set together".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeoutMs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Remote agent URL, if one is configured
    pub fn remote_url(&self) -> Option<&str> {
        self.jolokia_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Compiled include patterns
    pub fn include_patterns(&self) -> Result<Vec<ObjectNamePattern>, ConfigError> {
        parse_patterns(&self.include_object_names)
    }

    /// Compiled exclude patterns
    pub fn exclude_patterns(&self) -> Result<Vec<ObjectNamePattern>, ConfigError> {
        parse_patterns(&self.exclude_object_names)
    }

    /// Attribute filter seeded from the static include/exclude maps
    pub fn attribute_filter(&self) -> Result<AttributeFilter, ConfigError> {
        let mut filter =
            AttributeFilter::new().with_auto_exclude(self.auto_exclude_object_name_attributes);

        for (name, attributes) in &self.exclude_object_name_attributes {
            filter = filter.with_excluded(parse_name(name)?, attributes);
        }
        for (name, attributes) in &self.include_object_name_attributes {
            filter = filter.with_included(parse_name(name)?, attributes);
        }

        Ok(filter)
    }

    /// Compile the configured rules. No rules means a single default rule.
    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        Ok(RuleSet::compile(&self.rules)?)
    }
}

fn parse_patterns(patterns: &[String]) -> Result<Vec<ObjectNamePattern>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            ObjectNamePattern::parse(p).map_err(|e| {
                ConfigError::ValidationError(format!("Invalid object name pattern: {}", e))
            })
        })
        .collect()
}

fn parse_name(name: &str) -> Result<ObjectName, ConfigError> {
    ObjectName::parse(name)
        .map_err(|e| ConfigError::ValidationError(format!("Invalid attribute filter bean: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::MetricType;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.path, "/metrics");
        assert_eq!(config.timeout_ms, 5000);
        assert!(config.auto_exclude_object_name_attributes);
        assert!(config.remote_url().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
server:
  port: 9404
  path: /jmx
  bindAddress: 127.0.0.1
jolokiaUrl: https://app:8778/jolokia
username: admin
password: secret
ssl: true
timeoutMs: 2500
startDelaySeconds: 3
lowercaseOutputName: true
lowercaseOutputLabelNames: true
whitelistObjectNames: ["java.lang:*"]
blacklistObjectNames: ["java.lang:type=Runtime"]
excludeObjectNameAttributes:
  "java.lang:type=OperatingSystem": [ObjectName]
autoExcludeObjectNameAttributes: false
rules:
  - pattern: 'java.lang<type=(\w+)><>(\w+):'
    name: jvm_$1_$2
    type: COUNTER
    valueFactor: 0.001
    labels:
      kind: $1
    attrNameSnakeCase: true
    cache: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9404);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.remote_url(), Some("https://app:8778/jolokia"));
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.start_delay_seconds, 3);
        assert!(config.lowercase_output_name);
        assert_eq!(config.include_object_names, vec!["java.lang:*"]);
        assert_eq!(config.exclude_object_names, vec!["java.lang:type=Runtime"]);
        assert!(!config.auto_exclude_object_name_attributes);

        let rule = &config.rules[0];
        assert_eq!(rule.metric_type, MetricType::Counter);
        assert_eq!(rule.value_factor, Some(0.001));
        assert!(rule.attr_name_snake_case);
        assert!(rule.cache);
        assert_eq!(config.rule_set().unwrap().len(), 1);

        let filter = config.attribute_filter().unwrap();
        let os = ObjectName::parse("java.lang:type=OperatingSystem").unwrap();
        assert!(filter.exclude(&os, "ObjectName"));
        assert!(!filter.auto_exclude_enabled());
    }

    #[test]
    fn test_no_rules_means_default_rule() {
        let config = Config::default();
        let rules = config.rule_set().unwrap();
        assert_eq!(rules.len(), 1);
        assert!(!rules.get(0).unwrap().has_pattern());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.path = "metrics".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.path = "/health".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_require_remote() {
        let err = Config::from_yaml("username: a\npassword: b\n").unwrap_err();
        assert!(err.to_string().contains("jolokiaUrl"));

        let err = Config::from_yaml("ssl: true\n").unwrap_err();
        assert!(err.to_string().contains("jolokiaUrl"));

        let err = Config::from_yaml("jolokiaUrl: http://h:8778/jolokia\nssl: true\n").unwrap_err();
        assert!(err.to_string().contains("https"));

        assert!(Config::from_yaml("jolokiaUrl: ''\n").is_ok());
    }

    #[test]
    fn test_rule_companions_rejected() {
        let err = Config::from_yaml("rules:\n  - name: foo\n").unwrap_err();
        assert!(matches!(err, ConfigError::RuleError(_)));

        let err = Config::from_yaml("rules:\n  - pattern: x\n    help: h\n").unwrap_err();
        assert!(matches!(err, ConfigError::RuleError(_)));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = Config::from_yaml("rules:\n  - pattern: '(unclosed'\n    name: x\n").unwrap_err();
        assert!(matches!(err, ConfigError::RuleError(_)));
    }

    #[test]
    fn test_invalid_type_rejected() {
        let err =
            Config::from_yaml("rules:\n  - pattern: x\n    name: y\n    type: SUMMARY\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_invalid_object_name_pattern() {
        let err = Config::from_yaml("includeObjectNames: ['no-colon']\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_non_finite_value_factor() {
        let err = Config::from_yaml("rules:\n  - pattern: x\n    name: y\n    valueFactor: .nan\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::RuleError(_)));
    }
}
