//! Metric transformation module
//!
//! Turns flattened bean attributes into named, labeled, typed samples via the
//! configured rule set, groups them into snapshots and renders those in the
//! Prometheus text format.

mod cache;
mod engine;
mod formatter;
pub mod naming;
mod rules;
mod snapshot;

pub use cache::{MatchedRuleCache, RuleOutcome, StalenessTracker};
pub use engine::{MatchedRule, MatchingReceiver, MetricSample, RuleEngine};
pub use formatter::{PrometheusFormatter, TEXT_CONTENT_TYPE};
pub use naming::{to_safe_name, to_snake_lower_case};
pub use rules::{apply_substitution, convert_java_regex, MetricType, Rule, RuleConfig, RuleSet};
pub use snapshot::{convert, DataPoint, Labels, MetricSnapshot, BEAN_LABEL};
