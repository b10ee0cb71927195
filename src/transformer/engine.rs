//! Rule matching engine
//!
//! Applies the rule set to every flattened attribute leaf, first match wins,
//! and turns the winning rule into a named, labeled, typed sample.

use std::sync::Arc;
use tracing::trace;

use crate::collector::ScalarValue;
use crate::scraper::{AttributePath, Receiver};

use super::cache::{MatchedRuleCache, RuleOutcome, StalenessTracker};
use super::naming::{to_safe_name, to_snake_lower_case};
use super::rules::{apply_substitution, MetricType, Rule, RuleSet};

/// Separator used when building default metric names
const SEP: &str = "_";

/// A rule resolved against one attribute
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRule {
    /// Sanitized metric name
    pub name: String,
    /// `domain<props><keys>`, used to disambiguate colliding samples
    pub bean_name: String,
    /// Bean name plus attribute name, the cache key
    pub match_name: String,
    pub metric_type: MetricType,
    pub help: String,
    pub label_names: Vec<String>,
    pub label_values: Vec<String>,
    /// Value from the rule's value template, replacing the attribute value
    pub value_override: Option<f64>,
    pub value_factor: f64,
}

/// One exported sample
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub rule: Arc<MatchedRule>,
    pub value: f64,
}

/// Rule matching engine
///
/// Holds the compiled rules and the matched-rule cache that outlives
/// individual scrapes.
#[derive(Debug)]
pub struct RuleEngine {
    rules: RuleSet,
    cache: MatchedRuleCache,
    lowercase_names: bool,
    lowercase_labels: bool,
}

impl RuleEngine {
    pub fn new(rules: RuleSet) -> Self {
        let cache = MatchedRuleCache::new(rules.len());
        Self {
            rules,
            cache,
            lowercase_names: false,
            lowercase_labels: false,
        }
    }

    /// Set whether to lowercase metric names
    pub fn with_lowercase_names(mut self, lowercase: bool) -> Self {
        self.lowercase_names = lowercase;
        self
    }

    /// Set whether to lowercase label names
    pub fn with_lowercase_labels(mut self, lowercase: bool) -> Self {
        self.lowercase_labels = lowercase;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn cache(&self) -> &MatchedRuleCache {
        &self.cache
    }

    /// Start collecting samples for one scrape
    pub fn receiver(&self) -> MatchingReceiver<'_> {
        MatchingReceiver {
            engine: self,
            tracker: StalenessTracker::new(),
            samples: Vec::new(),
        }
    }

    /// Resolve the first matching rule for an attribute leaf.
    ///
    /// Suppressed metrics and unparsable value templates yield
    /// [`RuleOutcome::Unmatched`] without being cached.
    pub fn match_attribute(
        &self,
        path: &AttributePath<'_>,
        tracker: &mut StalenessTracker,
    ) -> RuleOutcome {
        let bean_name = format!(
            "{}<{}><{}>",
            path.domain,
            path.bean_properties,
            path.attr_keys.join(", ")
        );
        let snake_name = self
            .rules
            .iter()
            .any(|r| r.attr_name_snake_case)
            .then(|| to_snake_lower_case(path.attr_name));

        for rule in &self.rules {
            let attr_name = match (&snake_name, rule.attr_name_snake_case) {
                (Some(snake), true) => snake.as_str(),
                _ => path.attr_name,
            };
            let match_name = format!("{}{}", bean_name, attr_name);
            let input = format!("{}: {}", match_name, path.value);
            let cache_key = if rule.depends_on_value() {
                &input
            } else {
                &match_name
            };

            if rule.cache {
                if let Some(cached) = self.cache.get(rule.id, cache_key) {
                    tracker.add(rule.id, cache_key);
                    match cached {
                        RuleOutcome::Matched(_) => return cached,
                        RuleOutcome::Unmatched => continue,
                    }
                }
            }

            let Some(captures) = rule.captures(&input) else {
                self.remember(rule, cache_key, RuleOutcome::Unmatched, tracker);
                continue;
            };

            let value_override = match &rule.value {
                Some(template) => {
                    let substituted = apply_substitution(template, captures.as_ref());
                    match substituted.trim().parse::<f64>() {
                        Ok(v) => Some(v),
                        Err(_) => {
                            trace!(
                                bean = %bean_name,
                                attribute = %path.attr_name,
                                value = %substituted,
                                "Unable to parse value template result as a number"
                            );
                            return RuleOutcome::Unmatched;
                        }
                    }
                }
                None => None,
            };

            let help = format!(
                "{} ({}{})",
                path.attr_description, bean_name, path.attr_name
            );

            let matched = match &rule.name {
                None => self.default_export(
                    path,
                    bean_name.clone(),
                    match_name.clone(),
                    attr_name,
                    help,
                    value_override,
                    rule.value_factor,
                ),
                Some(template) => {
                    let captures = captures.as_ref();
                    let mut name = to_safe_name(&apply_substitution(template, captures));
                    if name.is_empty() {
                        return RuleOutcome::Unmatched;
                    }
                    if self.lowercase_names {
                        name = name.to_lowercase();
                    }

                    let help = match &rule.help {
                        Some(template) => apply_substitution(template, captures),
                        None => help,
                    };

                    let mut label_names = Vec::with_capacity(rule.labels.len());
                    let mut label_values = Vec::with_capacity(rule.labels.len());
                    for (name_template, value_template) in &rule.labels {
                        let mut label_name =
                            to_safe_name(&apply_substitution(name_template, captures));
                        let label_value = apply_substitution(value_template, captures);
                        if self.lowercase_labels {
                            label_name = label_name.to_lowercase();
                        }
                        if !label_name.is_empty() && !label_value.is_empty() {
                            label_names.push(label_name);
                            label_values.push(label_value);
                        }
                    }

                    MatchedRule {
                        name,
                        bean_name: bean_name.clone(),
                        match_name: match_name.clone(),
                        metric_type: rule.metric_type,
                        help,
                        label_names,
                        label_values,
                        value_override,
                        value_factor: rule.value_factor,
                    }
                }
            };

            let outcome = RuleOutcome::Matched(Arc::new(matched));
            self.remember(rule, cache_key, outcome.clone(), tracker);
            return outcome;
        }

        RuleOutcome::Unmatched
    }

    /// Match an attribute leaf and compute its sample value
    pub fn sample(
        &self,
        path: &AttributePath<'_>,
        tracker: &mut StalenessTracker,
    ) -> Option<MetricSample> {
        let RuleOutcome::Matched(rule) = self.match_attribute(path, tracker) else {
            return None;
        };

        let value = match rule.value_override {
            Some(v) => v,
            None => match path.value {
                ScalarValue::Text(_) => {
                    trace!(
                        bean = %rule.bean_name,
                        attribute = %path.attr_name,
                        "Ignoring non-numeric value"
                    );
                    return None;
                }
                other => other.as_f64()?,
            },
        };

        Some(MetricSample {
            value: value * rule.value_factor,
            rule,
        })
    }

    fn remember(
        &self,
        rule: &Rule,
        key: &str,
        outcome: RuleOutcome,
        tracker: &mut StalenessTracker,
    ) {
        if rule.cache {
            tracker.add(rule.id, key);
            self.cache.put(rule.id, key.to_string(), outcome);
        }
    }

    /// Positional default naming: domain, first property value, enclosing
    /// attribute names and the attribute name. Remaining properties become
    /// labels.
    #[allow(clippy::too_many_arguments)]
    fn default_export(
        &self,
        path: &AttributePath<'_>,
        bean_name: String,
        match_name: String,
        attr_name: &str,
        help: String,
        value_override: Option<f64>,
        value_factor: f64,
    ) -> MatchedRule {
        let mut name = String::from(path.domain);
        if let Some(first) = path.bean_properties.first_value() {
            name.push_str(SEP);
            name.push_str(first);
        }
        for key in path.attr_keys {
            name.push_str(SEP);
            name.push_str(key);
        }
        name.push_str(SEP);
        name.push_str(attr_name);

        let mut name = to_safe_name(&name);
        if self.lowercase_names {
            name = name.to_lowercase();
        }

        let (label_names, label_values) = path
            .bean_properties
            .iter()
            .skip(1)
            .map(|(key, value)| {
                let mut label = to_safe_name(key);
                if self.lowercase_labels {
                    label = label.to_lowercase();
                }
                (label, value.to_string())
            })
            .unzip();

        MatchedRule {
            name,
            bean_name,
            match_name,
            metric_type: MetricType::Gauge,
            help,
            label_names,
            label_values,
            value_override,
            value_factor,
        }
    }
}

/// [`Receiver`] that collects samples for one scrape
pub struct MatchingReceiver<'e> {
    engine: &'e RuleEngine,
    tracker: StalenessTracker,
    samples: Vec<MetricSample>,
}

impl MatchingReceiver<'_> {
    /// Samples collected so far, in discovery order
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Consume the receiver, returning the samples and the cache usage
    pub fn finish(self) -> (Vec<MetricSample>, StalenessTracker) {
        (self.samples, self.tracker)
    }
}

impl Receiver for MatchingReceiver<'_> {
    fn record_bean(&mut self, path: &AttributePath<'_>) {
        if let Some(sample) = self.engine.sample(path, &mut self.tracker) {
            self.samples.push(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{parse_key_properties, KeyProperties, ObjectName};
    use crate::transformer::rules::RuleConfig;

    struct Leaf {
        name: ObjectName,
        properties: KeyProperties,
        attr_keys: Vec<String>,
        attr_name: String,
        value: ScalarValue,
    }

    impl Leaf {
        fn new(bean: &str, attr_name: &str, value: ScalarValue) -> Self {
            let name = ObjectName::parse(bean).unwrap();
            let properties = parse_key_properties(name.key_property_list());
            Self {
                name,
                properties,
                attr_keys: Vec::new(),
                attr_name: attr_name.to_string(),
                value,
            }
        }

        fn with_keys(mut self, keys: &[&str]) -> Self {
            self.attr_keys = keys.iter().map(|k| k.to_string()).collect();
            self
        }

        fn path(&self) -> AttributePath<'_> {
            AttributePath {
                object_name: &self.name,
                domain: self.name.domain(),
                bean_properties: &self.properties,
                attr_keys: &self.attr_keys,
                attr_name: &self.attr_name,
                attr_type: "java.lang.Long",
                attr_description: "desc",
                value: &self.value,
            }
        }
    }

    fn compile_engine(rules: &[RuleConfig]) -> RuleEngine {
        RuleEngine::new(RuleSet::compile(rules).unwrap())
    }

    fn sample(engine: &RuleEngine, leaf: &Leaf) -> Option<MetricSample> {
        engine.sample(&leaf.path(), &mut StalenessTracker::new())
    }

    fn datanode(value: ScalarValue) -> Leaf {
        Leaf::new(
            "hadoop:service=DataNode,name=DataNodeActivity-ams-hdd001-50010",
            "replaceBlockOpMinTime",
            value,
        )
    }

    #[test]
    fn test_named_rule() {
        let engine = compile_engine(&[RuleConfig::new()
            .pattern("^hadoop<service=DataNode, name=DataNodeActivity-ams-hdd001-50010><>replaceBlockOpMinTime:")
            .name("foo")]);

        let s = sample(&engine, &datanode(ScalarValue::Integer(200))).unwrap();
        assert_eq!(s.rule.name, "foo");
        assert_eq!(s.value, 200.0);
        assert!(s.rule.label_names.is_empty());
        assert_eq!(s.rule.metric_type, MetricType::Untyped);
    }

    #[test]
    fn test_default_export() {
        let engine = compile_engine(&[]);
        let s = sample(&engine, &datanode(ScalarValue::Integer(200))).unwrap();

        assert_eq!(s.rule.name, "hadoop_DataNode_replaceBlockOpMinTime");
        assert_eq!(s.rule.label_names, vec!["name"]);
        assert_eq!(s.rule.label_values, vec!["DataNodeActivity-ams-hdd001-50010"]);
        assert_eq!(s.rule.metric_type, MetricType::Gauge);
        assert_eq!(
            s.rule.help,
            "desc (hadoop<service=DataNode, name=DataNodeActivity-ams-hdd001-50010><>replaceBlockOpMinTime)"
        );
    }

    #[test]
    fn test_default_export_with_attr_keys() {
        let engine = compile_engine(&[]);
        let leaf = Leaf::new("java.lang:type=Memory", "used", ScalarValue::Integer(5))
            .with_keys(&["HeapMemoryUsage"]);
        let s = sample(&engine, &leaf).unwrap();
        assert_eq!(s.rule.name, "java_lang_Memory_HeapMemoryUsage_used");
        assert!(s.rule.label_names.is_empty());
    }

    #[test]
    fn test_empty_name_suppresses() {
        let engine = compile_engine(&[
            RuleConfig::new().pattern("hadoop<.*>replaceBlockOpMinTime").name(""),
            RuleConfig::new().pattern(".*"),
        ]);
        assert!(sample(&engine, &datanode(ScalarValue::Integer(200))).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let engine = compile_engine(&[
            RuleConfig::new().pattern("hadoop<service=(\\w+)").name("first_$1"),
            RuleConfig::new().pattern(".*").name("second"),
        ]);
        let s = sample(&engine, &datanode(ScalarValue::Integer(1))).unwrap();
        assert_eq!(s.rule.name, "first_DataNode");
    }

    #[test]
    fn test_labels_and_help_substitution() {
        let engine = compile_engine(&[RuleConfig::new()
            .pattern("hadoop<service=(\\w+), name=(\\w+)-.*><>(\\w+):")
            .name("hadoop_$1_$3")
            .help("Help for $3")
            .label("instance", "$2")
            .label("$1", "yes")
            .label("empty", "$9")
            .metric_type(MetricType::Counter)]);

        let s = sample(&engine, &datanode(ScalarValue::Integer(1))).unwrap();
        assert_eq!(s.rule.name, "hadoop_DataNode_replaceBlockOpMinTime");
        assert_eq!(s.rule.help, "Help for replaceBlockOpMinTime");
        assert_eq!(s.rule.label_names, vec!["DataNode", "instance"]);
        assert_eq!(s.rule.label_values, vec!["yes", "DataNodeActivity"]);
        assert_eq!(s.rule.metric_type, MetricType::Counter);
    }

    #[test]
    fn test_value_template_and_factor() {
        let engine = compile_engine(&[RuleConfig::new()
            .pattern("replaceBlockOpMinTime: (\\d+)")
            .name("foo")
            .value("$1")
            .value_factor(0.001)]);

        let s = sample(&engine, &datanode(ScalarValue::Integer(1500))).unwrap();
        assert!((s.value - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_value_template_parse_failure_does_not_fall_through() {
        let engine = compile_engine(&[
            RuleConfig::new().pattern("replaceBlockOpMinTime").name("foo").value("abc"),
            RuleConfig::new().pattern(".*").name("bar"),
        ]);
        assert!(sample(&engine, &datanode(ScalarValue::Integer(1))).is_none());
    }

    #[test]
    fn test_text_value_needs_value_template() {
        let engine = compile_engine(&[RuleConfig::new().pattern(".*").name("state")]);
        assert!(sample(&engine, &datanode(ScalarValue::Text("RUNNING".into()))).is_none());

        let engine = compile_engine(&[RuleConfig::new()
            .pattern(": RUNNING")
            .name("state")
            .value("1")]);
        let s = sample(&engine, &datanode(ScalarValue::Text("RUNNING".into()))).unwrap();
        assert_eq!(s.value, 1.0);
    }

    #[test]
    fn test_boolean_values() {
        let engine = compile_engine(&[]);
        let t = sample(&engine, &datanode(ScalarValue::Boolean(true))).unwrap();
        let f = sample(&engine, &datanode(ScalarValue::Boolean(false))).unwrap();
        assert_eq!(t.value, 1.0);
        assert_eq!(f.value, 0.0);
    }

    #[test]
    fn test_snake_case_attribute_name() {
        let engine = compile_engine(&[RuleConfig::new()
            .pattern("<>replace_block_op_min_time:")
            .name("snake")
            .attr_name_snake_case(true)]);
        let s = sample(&engine, &datanode(ScalarValue::Integer(1))).unwrap();
        assert_eq!(s.rule.name, "snake");
    }

    #[test]
    fn test_lowercase_output() {
        let engine = compile_engine(&[])
            .with_lowercase_names(true)
            .with_lowercase_labels(true);
        let leaf = Leaf::new("Hadoop:Service=DataNode,Name=X", "Count", ScalarValue::Integer(1));
        let s = sample(&engine, &leaf).unwrap();
        assert_eq!(s.rule.name, "hadoop_datanode_count");
        assert_eq!(s.rule.label_names, vec!["name"]);
        assert_eq!(s.rule.label_values, vec!["X"]);
    }

    #[test]
    fn test_cache_hit_and_negative_entry() {
        let engine = compile_engine(&[
            RuleConfig::new().pattern("never").name("a").cache(true),
            RuleConfig::new().pattern("hadoop").name("b").cache(true),
        ]);
        let leaf = datanode(ScalarValue::Integer(1));

        let mut tracker = StalenessTracker::new();
        let first = engine.sample(&leaf.path(), &mut tracker).unwrap();
        assert_eq!(first.rule.name, "b");
        assert_eq!(engine.cache().len(), 2);
        assert_eq!(tracker.cached_count(), 2);

        let match_name =
            "hadoop<service=DataNode, name=DataNodeActivity-ams-hdd001-50010><>replaceBlockOpMinTime";
        assert!(matches!(engine.cache().get(0, match_name), Some(RuleOutcome::Unmatched)));
        assert!(engine.cache().get(1, match_name).unwrap().is_matched());

        let second = engine.sample(&leaf.path(), &mut StalenessTracker::new()).unwrap();
        assert!(Arc::ptr_eq(&first.rule, &second.rule));
    }

    #[test]
    fn test_cached_value_rule_follows_value() {
        let engine = compile_engine(&[RuleConfig::new()
            .pattern(r"replaceBlockOpMinTime: (\d+)")
            .name("min_time")
            .value("$1")
            .cache(true)]);

        let first = sample(&engine, &datanode(ScalarValue::Integer(1))).unwrap();
        let second = sample(&engine, &datanode(ScalarValue::Integer(2))).unwrap();
        assert_eq!(first.value, 1.0);
        assert_eq!(second.value, 2.0);

        let match_name =
            "hadoop<service=DataNode, name=DataNodeActivity-ams-hdd001-50010><>replaceBlockOpMinTime";
        assert!(engine.cache().get(0, match_name).is_none());
        assert!(engine
            .cache()
            .get(0, &format!("{}: 2", match_name))
            .unwrap()
            .is_matched());
    }

    #[test]
    fn test_cached_value_pattern_rematches() {
        let engine = compile_engine(&[
            RuleConfig::new().pattern(": RUNNING").name("state").value("1").cache(true),
            RuleConfig::new().pattern(": STOPPED").name("state").value("0").cache(true),
        ]);

        let running = sample(&engine, &datanode(ScalarValue::Text("RUNNING".into()))).unwrap();
        let stopped = sample(&engine, &datanode(ScalarValue::Text("STOPPED".into()))).unwrap();
        assert_eq!(running.value, 1.0);
        assert_eq!(stopped.value, 0.0);
    }

    #[test]
    fn test_uncached_rules_leave_cache_empty() {
        let engine = compile_engine(&[RuleConfig::new().pattern("hadoop").name("b")]);
        sample(&engine, &datanode(ScalarValue::Integer(1))).unwrap();
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_receiver_collects_samples() {
        let engine = compile_engine(&[]);
        let leaf = datanode(ScalarValue::Integer(7));
        let mut receiver = engine.receiver();
        receiver.record_bean(&leaf.path());
        let (samples, tracker) = receiver.finish();
        assert_eq!(samples.len(), 1);
        assert_eq!(tracker.cached_count(), 0);
    }
}
