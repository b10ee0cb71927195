//! Rule definitions
//!
//! Rules are declared in configuration as [`RuleConfig`] and compiled into a
//! [`RuleSet`]. Each compiled rule carries a stable id (its position in the
//! set) that keys the matched-rule cache.
//!
//! # Example
//!
//! ```ignore
//! use jmx_bridge::transformer::rules::{MetricType, RuleConfig, RuleSet};
//!
//! let rules = RuleSet::compile(&[
//!     RuleConfig::new()
//!         .pattern("java.lang<type=Memory><HeapMemoryUsage>(\\w+)")
//!         .name("jvm_memory_heap_$1_bytes")
//!         .metric_type(MetricType::Gauge),
//! ])?;
//! ```

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::RuleError;

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Prometheus metric type
///
/// The default type is `Untyped` when not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetricType {
    /// Gauge metric - a value that can go up and down
    Gauge,
    /// Counter metric - a monotonically increasing value
    Counter,
    /// Untyped metric - type is not specified
    #[default]
    Untyped,
}

impl MetricType {
    /// Returns the Prometheus type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::Untyped => "untyped",
        }
    }
}

impl Serialize for MetricType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            "untyped" | "unknown" => Ok(MetricType::Untyped),
            other => Err(serde::de::Error::custom(format!(
                "unknown metric type '{}', expected one of: gauge, counter, untyped",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rule as declared in configuration
///
/// # Example Configuration (YAML)
///
/// ```yaml
/// pattern: "java.lang<type=Memory><HeapMemoryUsage>(\\w+)"
/// name: "jvm_memory_heap_$1_bytes"
/// type: gauge
/// help: "JVM heap memory usage"
/// labels:
///   area: "heap"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Regex matched against `bean<props><keys>attr: value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Output metric name template; absent means default naming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Value template, parsed as a float after substitution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Factor to multiply the value by (e.g. 0.001 for ms to s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_factor: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,

    /// Label name and value templates
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(rename = "type", default)]
    pub metric_type: MetricType,

    /// Snake-case the attribute name before matching
    #[serde(default)]
    pub attr_name_snake_case: bool,

    /// Cache match outcomes for this rule
    #[serde(default)]
    pub cache: bool,
}

impl RuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn value_factor(mut self, factor: f64) -> Self {
        self.value_factor = Some(factor);
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn metric_type(mut self, metric_type: MetricType) -> Self {
        self.metric_type = metric_type;
        self
    }

    pub fn attr_name_snake_case(mut self, enabled: bool) -> Self {
        self.attr_name_snake_case = enabled;
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Check companion-field invariants without compiling the pattern
    pub fn validate(&self, index: usize) -> RuleResult<()> {
        if self.name.is_some() && self.pattern.is_none() {
            return Err(RuleError::MissingCompanion {
                index,
                reason: "'name' requires 'pattern'".to_string(),
            });
        }
        if !self.labels.is_empty() && self.name.is_none() {
            return Err(RuleError::MissingCompanion {
                index,
                reason: "'labels' requires 'name'".to_string(),
            });
        }
        if self.help.is_some() && self.name.is_none() {
            return Err(RuleError::MissingCompanion {
                index,
                reason: "'help' requires 'name'".to_string(),
            });
        }
        if let Some(factor) = self.value_factor {
            if !factor.is_finite() {
                return Err(RuleError::InvalidValueFactor { index, factor });
            }
        }
        Ok(())
    }
}

/// Compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    /// Position in the rule set
    pub id: usize,
    pattern: Option<Regex>,
    pattern_source: Option<String>,
    pub name: Option<String>,
    pub help: Option<String>,
    pub value: Option<String>,
    pub value_factor: f64,
    /// Label templates, sorted by name template
    pub labels: Vec<(String, String)>,
    pub metric_type: MetricType,
    pub attr_name_snake_case: bool,
    pub cache: bool,
}

impl Rule {
    /// Compile a configured rule.
    ///
    /// The pattern is wrapped as `^.*(?:PATTERN).*$`, so it may match
    /// anywhere in the input while still requiring a full match.
    pub fn compile(id: usize, config: &RuleConfig) -> RuleResult<Self> {
        config.validate(id)?;

        let pattern = match &config.pattern {
            Some(source) => {
                let converted = convert_java_regex(source)?;
                let anchored = format!("^.*(?:{}).*$", converted);
                Some(
                    Regex::new(&anchored).map_err(|e| RuleError::InvalidPattern {
                        pattern: source.clone(),
                        source: Box::new(e),
                    })?,
                )
            }
            None => None,
        };

        Ok(Self {
            id,
            pattern,
            pattern_source: config.pattern.clone(),
            name: config.name.clone(),
            help: config.help.clone(),
            value: config.value.clone().filter(|v| !v.is_empty()),
            value_factor: config.value_factor.unwrap_or(1.0),
            labels: config
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            metric_type: config.metric_type,
            attr_name_snake_case: config.attr_name_snake_case,
            cache: config.cache,
        })
    }

    /// Whether the outcome can change with the attribute value.
    ///
    /// True for rules with a `value` template and for patterns that reach
    /// past the `attr:` separator into the value. Such rules are cached
    /// per value.
    pub fn depends_on_value(&self) -> bool {
        if self.value.is_some() {
            return true;
        }
        match &self.pattern_source {
            Some(source) => {
                let body = source.trim_end_matches('$');
                body.find(':').is_some_and(|pos| pos + 1 < body.len())
            }
            None => false,
        }
    }

    /// The pattern as configured
    pub fn pattern_source(&self) -> Option<&str> {
        self.pattern_source.as_deref()
    }

    pub fn has_pattern(&self) -> bool {
        self.pattern.is_some()
    }

    /// Match `input` against the pattern.
    ///
    /// Returns `Some(None)` for a pattern-less rule, which matches everything.
    pub fn captures<'h>(&self, input: &'h str) -> Option<Option<Captures<'h>>> {
        match &self.pattern {
            Some(re) => re.captures(input).map(Some),
            None => Some(None),
        }
    }
}

/// Ordered collection of compiled rules
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile configured rules. An empty list yields one pattern-less rule
    /// that exports everything under default names.
    pub fn compile(configs: &[RuleConfig]) -> RuleResult<Self> {
        if configs.is_empty() {
            return Ok(Self::default_rules());
        }

        let rules = configs
            .iter()
            .enumerate()
            .map(|(index, config)| {
                Rule::compile(index, config).map_err(|e| RuleError::RuleCompileFailed {
                    index,
                    source: Box::new(e),
                })
            })
            .collect::<RuleResult<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Single catch-all rule
    pub fn default_rules() -> Self {
        Self {
            rules: vec![Rule {
                id: 0,
                pattern: None,
                pattern_source: None,
                name: None,
                help: None,
                value: None,
                value_factor: 1.0,
                labels: Vec::new(),
                metric_type: MetricType::Untyped,
                attr_name_snake_case: false,
                cache: false,
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn get(&self, id: usize) -> Option<&Rule> {
        self.rules.get(id)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Convert Java regex syntax to Rust regex syntax
///
/// Handles common differences between Java and Rust regex:
/// - Named groups: `(?<name>...)` → `(?P<name>...)`
/// - Possessive quantifiers: `++`, `*+`, `?+` → `+`, `*`, `?` (with warning)
/// - Lookaround and atomic groups: rejected
///
/// # Errors
///
/// Returns `RuleError::UnsupportedSyntax` for unsupported features.
pub fn convert_java_regex(pattern: &str) -> RuleResult<String> {
    let unsupported = |feature: &str| RuleError::UnsupportedSyntax {
        pattern: pattern.to_string(),
        feature: feature.to_string(),
    };

    let mut result = String::with_capacity(pattern.len() + 16);
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '(' => {
                if chars.peek() == Some(&'?') {
                    chars.next(); // consume '?'
                    match chars.peek() {
                        Some('<') => {
                            chars.next(); // consume '<'
                            match chars.peek() {
                                Some('=') => {
                                    return Err(unsupported(
                                        "positive lookbehind assertions (?<=...)",
                                    ))
                                }
                                Some('!') => {
                                    return Err(unsupported(
                                        "negative lookbehind assertions (?<!...)",
                                    ))
                                }
                                _ => result.push_str("(?P<"),
                            }
                        }
                        Some('>') => return Err(unsupported("atomic groups (?>...)")),
                        Some('=') => {
                            return Err(unsupported("positive lookahead assertions (?=...)"))
                        }
                        Some('!') => {
                            return Err(unsupported("negative lookahead assertions (?!...)"))
                        }
                        _ => result.push_str("(?"),
                    }
                } else {
                    result.push('(');
                }
            }
            '+' | '*' | '?' => {
                result.push(c);
                if chars.peek() == Some(&'+') {
                    chars.next();
                    tracing::warn!(
                        pattern = %pattern,
                        "Possessive quantifier '{}+' converted to '{}' - behavior may differ",
                        c, c
                    );
                }
            }
            '\\' => {
                result.push(c);
                if let Some(escaped) = chars.next() {
                    result.push(escaped);
                }
            }
            '[' => {
                // Quantifier characters inside a class are literals.
                result.push(c);
                let mut escaped = false;
                if chars.peek() == Some(&']') {
                    chars.next();
                    result.push(']');
                }
                for inner in chars.by_ref() {
                    result.push(inner);
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == ']' {
                        break;
                    }
                }
            }
            _ => result.push(c),
        }
    }

    Ok(result)
}

/// Apply capture group substitution to a template string
///
/// Replaces `$1`, `${name}` and `$name` with the corresponding capture
/// group values, missing groups with the empty string. `\$` is a literal `$`.
/// A pattern-less rule has no captures, so every reference is empty.
pub fn apply_substitution(template: &str, captures: Option<&Captures<'_>>) -> String {
    if !template.contains(['$', '\\']) {
        return template.to_string();
    }

    let group = |index: usize| {
        captures
            .and_then(|c| c.get(index))
            .map(|m| m.as_str())
            .unwrap_or("")
    };
    let named = |name: &str| {
        captures
            .and_then(|c| c.name(name))
            .map(|m| m.as_str())
            .unwrap_or("")
    };

    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => result.push(escaped),
                None => result.push('\\'),
            },
            '$' => match chars.peek() {
                Some(&first) if first.is_ascii_digit() => {
                    let mut group_num = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_digit() {
                            group_num.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if let Ok(index) = group_num.parse::<usize>() {
                        result.push_str(group(index));
                    }
                }
                Some('{') => {
                    chars.next();
                    let mut group_name = String::new();
                    for next in chars.by_ref() {
                        if next == '}' {
                            break;
                        }
                        group_name.push(next);
                    }
                    result.push_str(named(&group_name));
                }
                Some(&first) if first.is_alphabetic() => {
                    // Letters and digits only, so "$type_$attr" splits at '_'.
                    let mut group_name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_alphanumeric() {
                            group_name.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    result.push_str(named(&group_name));
                }
                _ => result.push('$'),
            },
            _ => result.push(c),
        }
    }

    result
}
