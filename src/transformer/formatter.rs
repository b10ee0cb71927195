//! Prometheus Exposition Format output
//!
//! Serializes metric snapshots into the text exposition format (version 0.0.4).
//!
//! # Format
//!
//! ```text
//! # HELP <metric_name> <help_text>
//! # TYPE <metric_name> <type>
//! <metric_name>{<label1>="<value1>",<label2>="<value2>"} <value>
//! ```

use super::snapshot::{DataPoint, MetricSnapshot};

/// Content type of the text exposition format
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus exposition format formatter
///
/// # Example
///
/// ```
/// use jmx_bridge::transformer::{MetricSnapshot, MetricType, PrometheusFormatter};
///
/// let snapshots = vec![MetricSnapshot::single(
///     "jvm_threads_live",
///     "Live threads",
///     MetricType::Gauge,
///     42.0,
/// )];
///
/// let output = PrometheusFormatter::new().format(&snapshots);
/// assert!(output.contains("jvm_threads_live 42"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PrometheusFormatter {
    /// Emit HELP lines for snapshots with empty help text
    keep_empty_help: bool,
}

impl PrometheusFormatter {
    /// Create a new formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `# HELP` even when the help text is empty
    pub fn with_empty_help(mut self, keep: bool) -> Self {
        self.keep_empty_help = keep;
        self
    }

    /// Format snapshots into Prometheus exposition format.
    ///
    /// HELP and TYPE are emitted once per snapshot. Snapshot order and data
    /// point order are kept as given.
    pub fn format(&self, snapshots: &[MetricSnapshot]) -> String {
        if snapshots.is_empty() {
            return String::new();
        }

        let points: usize = snapshots.iter().map(|s| s.data_points.len() + 2).sum();
        let mut output = String::with_capacity(points * 80);

        for snapshot in snapshots {
            if self.keep_empty_help || !snapshot.help.is_empty() {
                output.push_str(&format!(
                    "# HELP {} {}\n",
                    snapshot.name,
                    Self::escape_help(&snapshot.help)
                ));
            }
            output.push_str(&format!(
                "# TYPE {} {}\n",
                snapshot.name,
                snapshot.metric_type.as_str()
            ));

            for point in &snapshot.data_points {
                output.push_str(&Self::format_data_point(&snapshot.name, point));
                output.push('\n');
            }
        }

        output
    }

    /// Format a single sample line
    fn format_data_point(name: &str, point: &DataPoint) -> String {
        let mut line = name.to_string();

        if !point.labels.is_empty() {
            let label_pairs: Vec<String> = point
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, Self::escape_label_value(v)))
                .collect();

            line.push('{');
            line.push_str(&label_pairs.join(","));
            line.push('}');
        }

        line.push(' ');
        line.push_str(&Self::format_value(point.value));
        line
    }

    /// Format a numeric value for Prometheus
    ///
    /// - NaN → "NaN"
    /// - +Inf → "+Inf"
    /// - -Inf → "-Inf"
    /// - Integers are formatted without decimal point
    /// - Large/small floats use scientific notation
    pub fn format_value(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            if value.is_sign_positive() {
                "+Inf".to_string()
            } else {
                "-Inf".to_string()
            }
        } else if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else if value.abs() >= 1e6 || (value.abs() < 1e-3 && value != 0.0) {
            format!("{:e}", value)
        } else {
            format!("{}", value)
        }
    }

    /// Escapes backslash and newline characters.
    fn escape_help(help: &str) -> String {
        help.replace('\\', "\\\\").replace('\n', "\\n")
    }

    /// Escapes backslash, double-quote, and newline characters.
    fn escape_label_value(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '\\' => escaped.push_str("\\\\"),
                '"' => escaped.push_str("\\\""),
                '\n' => escaped.push_str("\\n"),
                _ => escaped.push(c),
            }
        }
        escaped
    }
}
