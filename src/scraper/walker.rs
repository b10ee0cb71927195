//! Bean tree walker
//!
//! Enumerates beans, fetches their attributes and flattens composite and
//! tabular values into scalar leaves for a [`Receiver`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::collector::{
    AttributeInfo, BeanServer, BeanValue, CollectResult, KeyProperties, ObjectName,
    ObjectNamePattern, ScalarValue,
};
use crate::error::CollectorError;
use crate::transformer::to_safe_name;

use super::filter::AttributeFilter;
use super::property_cache::PropertyListCache;

/// One flattened scalar leaf and where it came from
#[derive(Debug, Clone, Copy)]
pub struct AttributePath<'a> {
    /// Bean the leaf belongs to
    pub object_name: &'a ObjectName,
    pub domain: &'a str,
    /// Bean key properties, extended with tabular index fields
    pub bean_properties: &'a KeyProperties,
    /// Enclosing attribute names, outermost first
    pub attr_keys: &'a [String],
    pub attr_name: &'a str,
    pub attr_type: &'a str,
    pub attr_description: &'a str,
    pub value: &'a ScalarValue,
}

/// Consumer of flattened leaves
pub trait Receiver {
    fn record_bean(&mut self, path: &AttributePath<'_>);
}

/// Per-scrape walker statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    /// Beans whose attributes were fetched
    pub beans_scraped: usize,
    /// Beans skipped after a fetch error
    pub bean_failures: usize,
}

/// Walks a bean server and feeds every scalar leaf to a receiver
pub struct Scraper {
    server: Arc<dyn BeanServer>,
    include: Vec<ObjectNamePattern>,
    exclude: Vec<ObjectNamePattern>,
    properties: PropertyListCache,
    filter: AttributeFilter,
}

impl Scraper {
    /// An empty include list means every bean.
    pub fn new(
        server: Arc<dyn BeanServer>,
        include: Vec<ObjectNamePattern>,
        exclude: Vec<ObjectNamePattern>,
        filter: AttributeFilter,
    ) -> Self {
        let include = if include.is_empty() {
            vec![ObjectNamePattern::all()]
        } else {
            include
        };

        Self {
            server,
            include,
            exclude,
            properties: PropertyListCache::new(),
            filter,
        }
    }

    pub fn property_cache(&self) -> &PropertyListCache {
        &self.properties
    }

    pub fn filter(&self) -> &AttributeFilter {
        &self.filter
    }

    /// Run one scrape.
    ///
    /// Fails only on enumeration errors and connection-level failures.
    /// Any other per-bean error is logged and counted.
    pub async fn scrape<R: Receiver + Send>(
        &self,
        receiver: &mut R,
    ) -> Result<ScrapeStats, CollectorError> {
        let names = self.enumerate().await?;

        let alive: HashSet<ObjectName> = names.iter().cloned().collect();
        self.properties.only_keep(&alive);
        self.filter.only_keep(&alive);

        let mut stats = ScrapeStats::default();
        for name in &names {
            match self.scrape_bean(name, receiver).await {
                Ok(()) => stats.beans_scraped += 1,
                Err(e) if e.is_connection_failure() => return Err(e),
                Err(e) => {
                    warn!(mbean = %name, error = %e, "Failed to scrape bean");
                    stats.bean_failures += 1;
                }
            }
        }

        debug!(
            beans = stats.beans_scraped,
            failures = stats.bean_failures,
            "Scrape finished"
        );
        Ok(stats)
    }

    /// Union of include matches minus exclude matches, in canonical order
    async fn enumerate(&self) -> CollectResult<BTreeSet<ObjectName>> {
        let mut names = BTreeSet::new();
        for pattern in &self.include {
            names.extend(self.server.query_names(pattern).await?);
        }

        names.retain(|name| {
            let excluded = self.exclude.iter().any(|p| p.matches(name));
            if excluded {
                trace!(mbean = %name, "Bean excluded by pattern");
            }
            !excluded
        });

        Ok(names)
    }

    async fn scrape_bean<R: Receiver + Send>(
        &self,
        name: &ObjectName,
        receiver: &mut R,
    ) -> CollectResult<()> {
        let infos: Vec<AttributeInfo> = self
            .server
            .attribute_infos(name)
            .await?
            .into_iter()
            .filter(|info| {
                if !info.readable {
                    trace!(mbean = %name, attribute = %info.name, "Skipping unreadable attribute");
                    return false;
                }
                !self.filter.exclude(name, &info.name)
            })
            .collect();

        if infos.is_empty() {
            return Ok(());
        }

        let values = self.fetch_attributes(name, &infos).await?;
        let properties = self.properties.get(name);

        for (attr_name, value) in &values {
            let Some(info) = infos.iter().find(|i| &i.name == attr_name) else {
                continue;
            };

            if value.is_unsupported() && self.filter.add_auto_exclusion(name, attr_name) {
                debug!(
                    mbean = %name,
                    attribute = %attr_name,
                    "Auto-excluding attribute with unsupported value"
                );
            }

            let mut walk = Walk {
                receiver: &mut *receiver,
                object_name: name,
            };
            walk.process_value(
                &properties,
                &[],
                attr_name,
                &info.type_name,
                &info.description,
                value,
            );
        }

        Ok(())
    }

    /// Batch fetch, falling back to one-by-one reads when the batch fails
    async fn fetch_attributes(
        &self,
        name: &ObjectName,
        infos: &[AttributeInfo],
    ) -> CollectResult<Vec<(String, BeanValue)>> {
        let batch_err = match self.server.get_attributes(name, infos).await {
            Ok(values) => return Ok(values),
            Err(e) if e.is_connection_failure() => return Err(e),
            Err(e) => e,
        };

        debug!(mbean = %name, error = %batch_err, "Batch read failed, reading attributes one by one");

        let mut values = Vec::with_capacity(infos.len());
        for info in infos {
            match self
                .server
                .get_attributes(name, std::slice::from_ref(info))
                .await
            {
                Ok(mut single) => values.append(&mut single),
                Err(e) if e.is_connection_failure() => return Err(e),
                Err(e) => {
                    debug!(mbean = %name, attribute = %info.name, error = %e, "Attribute read failed")
                }
            }
        }

        if values.is_empty() {
            return Err(batch_err);
        }
        Ok(values)
    }
}

/// Recursive flattening state for one bean
struct Walk<'r, R: Receiver> {
    receiver: &'r mut R,
    object_name: &'r ObjectName,
}

impl<R: Receiver> Walk<'_, R> {
    fn process_value(
        &mut self,
        bean_properties: &KeyProperties,
        attr_keys: &[String],
        attr_name: &str,
        attr_type: &str,
        attr_description: &str,
        value: &BeanValue,
    ) {
        match value {
            BeanValue::Null => {
                trace!(mbean = %self.object_name, attribute = %attr_name, "null value, skipping");
            }
            BeanValue::Scalar(scalar) => {
                self.receiver.record_bean(&AttributePath {
                    object_name: self.object_name,
                    domain: self.object_name.domain(),
                    bean_properties,
                    attr_keys,
                    attr_name,
                    attr_type,
                    attr_description,
                    value: scalar,
                });
            }
            BeanValue::Composite(composite) => {
                let keys = extend(attr_keys, attr_name);
                let mut fields: Vec<_> = composite.fields.iter().collect();
                fields.sort_by(|a, b| a.name.cmp(&b.name));

                for field in fields {
                    self.process_value(
                        bean_properties,
                        &keys,
                        &field.name,
                        &field.type_name,
                        &composite.description,
                        &field.value,
                    );
                }
            }
            BeanValue::Tabular(table) => {
                let keys = extend(attr_keys, attr_name);

                for row in &table.rows {
                    let mut row_properties = bean_properties.clone();
                    for index in &table.index_names {
                        let Some(BeanValue::Scalar(index_value)) = row.get(index) else {
                            continue;
                        };
                        let key = unique_index_key(&row_properties, index);
                        row_properties.insert(key, index_value.to_string());
                    }

                    let mut value_fields: Vec<_> = row
                        .fields
                        .iter()
                        .filter(|f| !table.index_names.contains(&f.name))
                        .collect();
                    value_fields.sort_by(|a, b| a.name.cmp(&b.name));

                    for field in value_fields {
                        // A field called "value" stands for the parent attribute itself.
                        let (path, name) = if field.name.eq_ignore_ascii_case("value") {
                            (attr_keys, attr_name)
                        } else {
                            (keys.as_slice(), field.name.as_str())
                        };
                        self.process_value(
                            &row_properties,
                            path,
                            name,
                            &field.type_name,
                            &row.description,
                            &field.value,
                        );
                    }
                }
            }
            BeanValue::Array(_) | BeanValue::Unsupported(_) => {
                debug!(
                    mbean = %self.object_name,
                    attribute = %attr_name,
                    value_type = %value.type_name(),
                    "Unsupported value type, skipping"
                );
            }
        }
    }
}

/// Property key for a tabular index field.
///
/// Nested tables repeat index names, and the keys later become label names
/// after sanitizing and optional lowercasing, so uniqueness is checked on
/// that form: `key`, `key_2`, `key_3`, ...
fn unique_index_key(properties: &KeyProperties, index: &str) -> String {
    let label_form = |key: &str| to_safe_name(key).to_lowercase();
    let taken: HashSet<String> = properties.iter().map(|(key, _)| label_form(key)).collect();

    if !taken.contains(&label_form(index)) {
        return index.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", index, n);
        if !taken.contains(&label_form(&candidate)) {
            return candidate;
        }
        n += 1;
    }
}

fn extend(attr_keys: &[String], attr_name: &str) -> Vec<String> {
    let mut keys = Vec::with_capacity(attr_keys.len() + 1);
    keys.extend_from_slice(attr_keys);
    keys.push(attr_name.to_string());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CompositeValue, LocalBeanServer, StaticBean, TabularValue};
    use async_trait::async_trait;

    #[derive(Debug, PartialEq)]
    struct Leaf {
        bean: String,
        properties: Vec<(String, String)>,
        attr_keys: Vec<String>,
        attr_name: String,
        value: ScalarValue,
    }

    #[derive(Default)]
    struct Collecting(Vec<Leaf>);

    impl Receiver for Collecting {
        fn record_bean(&mut self, path: &AttributePath<'_>) {
            self.0.push(Leaf {
                bean: path.object_name.to_string(),
                properties: path
                    .bean_properties
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                attr_keys: path.attr_keys.to_vec(),
                attr_name: path.attr_name.to_string(),
                value: path.value.clone(),
            });
        }
    }

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    fn scraper(server: LocalBeanServer) -> Scraper {
        Scraper::new(Arc::new(server), vec![], vec![], AttributeFilter::new())
    }

    #[tokio::test]
    async fn test_scalar_leaves() {
        let server = LocalBeanServer::new();
        server.register(
            name("a:type=B"),
            StaticBean::new()
                .with_attribute("Count", BeanValue::integer(3))
                .with_attribute("Nothing", BeanValue::Null),
        );

        let mut receiver = Collecting::default();
        let stats = scraper(server).scrape(&mut receiver).await.unwrap();

        assert_eq!(stats.beans_scraped, 1);
        assert_eq!(receiver.0.len(), 1);
        assert_eq!(receiver.0[0].attr_name, "Count");
        assert!(receiver.0[0].attr_keys.is_empty());
    }

    #[tokio::test]
    async fn test_composite_appends_attribute_name() {
        let server = LocalBeanServer::new();
        let usage = CompositeValue::new("memory usage")
            .with_field("used", BeanValue::integer(10))
            .with_field("max", BeanValue::integer(20));
        server.register(
            name("java.lang:type=Memory"),
            StaticBean::new().with_attribute("HeapMemoryUsage", BeanValue::Composite(usage)),
        );

        let mut receiver = Collecting::default();
        scraper(server).scrape(&mut receiver).await.unwrap();

        let names: Vec<_> = receiver.0.iter().map(|l| l.attr_name.as_str()).collect();
        assert_eq!(names, vec!["max", "used"]);
        assert_eq!(receiver.0[0].attr_keys, vec!["HeapMemoryUsage".to_string()]);
    }

    #[tokio::test]
    async fn test_tabular_index_becomes_property() {
        let server = LocalBeanServer::new();
        let table = TabularValue::new(["source"]).with_row(
            CompositeValue::new("disk")
                .with_field("source", BeanValue::text("/dev/sda1"))
                .with_field("size", BeanValue::integer(7516192768))
                .with_field("pcent", BeanValue::integer(23)),
        );
        server.register(
            name("io.prometheus.jmx:type=tabularData"),
            StaticBean::new().with_attribute("Server 1 Disk Usage Table", BeanValue::Tabular(table)),
        );

        let mut receiver = Collecting::default();
        scraper(server).scrape(&mut receiver).await.unwrap();

        assert_eq!(receiver.0.len(), 2);
        let size = receiver.0.iter().find(|l| l.attr_name == "size").unwrap();
        assert_eq!(
            size.properties,
            vec![
                ("type".to_string(), "tabularData".to_string()),
                ("source".to_string(), "/dev/sda1".to_string()),
            ]
        );
        assert_eq!(size.attr_keys, vec!["Server 1 Disk Usage Table".to_string()]);
    }

    #[tokio::test]
    async fn test_tabular_value_field_uses_parent_name() {
        let server = LocalBeanServer::new();
        let table = TabularValue::new(["key"]).with_row(
            CompositeValue::new("row")
                .with_field("key", BeanValue::text("type"))
                .with_field("Value", BeanValue::integer(5)),
        );
        server.register(
            name("a:type=B"),
            StaticBean::new().with_attribute("Props", BeanValue::Tabular(table)),
        );

        let mut receiver = Collecting::default();
        scraper(server).scrape(&mut receiver).await.unwrap();

        assert_eq!(receiver.0.len(), 1);
        let leaf = &receiver.0[0];
        assert_eq!(leaf.attr_name, "Props");
        assert!(leaf.attr_keys.is_empty());
        assert_eq!(leaf.properties[1], ("key".to_string(), "type".to_string()));
    }

    #[tokio::test]
    async fn test_colliding_index_name_is_suffixed() {
        let server = LocalBeanServer::new();
        let table = TabularValue::new(["type"]).with_row(
            CompositeValue::new("row")
                .with_field("type", BeanValue::text("inner"))
                .with_field("count", BeanValue::integer(1)),
        );
        server.register(
            name("a:type=B"),
            StaticBean::new().with_attribute("T", BeanValue::Tabular(table)),
        );

        let mut receiver = Collecting::default();
        scraper(server).scrape(&mut receiver).await.unwrap();

        assert_eq!(
            receiver.0[0].properties,
            vec![
                ("type".to_string(), "B".to_string()),
                ("type_2".to_string(), "inner".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_nested_tables_get_distinct_index_keys() {
        let server = LocalBeanServer::new();
        let innermost = TabularValue::new(["key"]).with_row(
            CompositeValue::new("row")
                .with_field("key", BeanValue::text("c"))
                .with_field("count", BeanValue::integer(1)),
        );
        let middle = TabularValue::new(["key"]).with_row(
            CompositeValue::new("row")
                .with_field("key", BeanValue::text("b"))
                .with_field("inner", BeanValue::Tabular(innermost)),
        );
        let outer = TabularValue::new(["key"]).with_row(
            CompositeValue::new("row")
                .with_field("key", BeanValue::text("a"))
                .with_field("inner", BeanValue::Tabular(middle)),
        );
        server.register(
            name("a:type=B"),
            StaticBean::new().with_attribute("T", BeanValue::Tabular(outer)),
        );

        let mut receiver = Collecting::default();
        scraper(server).scrape(&mut receiver).await.unwrap();

        assert_eq!(receiver.0.len(), 1);
        let leaf = &receiver.0[0];
        assert_eq!(leaf.attr_keys, vec!["T", "inner", "inner"]);
        assert_eq!(leaf.attr_name, "count");
        assert_eq!(
            leaf.properties,
            vec![
                ("type".to_string(), "B".to_string()),
                ("key".to_string(), "a".to_string()),
                ("key_2".to_string(), "b".to_string()),
                ("key_3".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn test_index_key_unique_after_sanitizing() {
        let properties: KeyProperties = [("type", "B"), ("a.b", "x"), ("Key", "y")]
            .into_iter()
            .collect();
        assert_eq!(unique_index_key(&properties, "a_b"), "a_b_2");
        assert_eq!(unique_index_key(&properties, "key"), "key_2");
        assert_eq!(unique_index_key(&properties, "other"), "other");
    }

    #[tokio::test]
    async fn test_unsupported_value_is_auto_excluded() {
        let server = LocalBeanServer::new();
        server.register(
            name("a:type=B"),
            StaticBean::new()
                .with_attribute("Tags", BeanValue::Array(vec![BeanValue::text("x")]))
                .with_attribute("Count", BeanValue::integer(1)),
        );
        let scraper = scraper(server);

        let mut receiver = Collecting::default();
        scraper.scrape(&mut receiver).await.unwrap();

        assert_eq!(receiver.0.len(), 1);
        assert!(scraper.filter().exclude(&name("a:type=B"), "Tags"));
    }

    #[tokio::test]
    async fn test_include_and_exclude_patterns() {
        let server = LocalBeanServer::new();
        for bean in ["java.lang:type=Memory", "java.lang:type=Threading", "kafka:type=Broker"] {
            server.register(
                name(bean),
                StaticBean::new().with_attribute("X", BeanValue::integer(1)),
            );
        }
        let scraper = Scraper::new(
            Arc::new(server),
            vec![ObjectNamePattern::parse("java.lang:*").unwrap()],
            vec![ObjectNamePattern::parse("java.lang:type=Threading").unwrap()],
            AttributeFilter::new(),
        );

        let mut receiver = Collecting::default();
        let stats = scraper.scrape(&mut receiver).await.unwrap();

        assert_eq!(stats.beans_scraped, 1);
        assert_eq!(receiver.0[0].bean, "java.lang:type=Memory");
    }

    #[tokio::test]
    async fn test_batch_failure_falls_back_to_single_reads() {
        let server = LocalBeanServer::new();
        server.register(
            name("a:type=B"),
            StaticBean::new()
                .with_attribute("Good", BeanValue::integer(1))
                .with_failing_attribute("Bad", "boom"),
        );

        let mut receiver = Collecting::default();
        let stats = scraper(server).scrape(&mut receiver).await.unwrap();

        assert_eq!(stats.bean_failures, 0);
        assert_eq!(receiver.0.len(), 1);
        assert_eq!(receiver.0[0].attr_name, "Good");
    }

    #[tokio::test]
    async fn test_bean_failure_does_not_abort() {
        let server = LocalBeanServer::new();
        server.register(
            name("a:type=Broken"),
            StaticBean::new().with_failing_attribute("Bad", "boom"),
        );
        server.register(
            name("a:type=Fine"),
            StaticBean::new().with_attribute("Good", BeanValue::integer(1)),
        );

        let mut receiver = Collecting::default();
        let stats = scraper(server).scrape(&mut receiver).await.unwrap();

        assert_eq!(stats.beans_scraped, 1);
        assert_eq!(stats.bean_failures, 1);
        assert_eq!(receiver.0.len(), 1);
    }

    struct Unreachable;

    #[async_trait]
    impl BeanServer for Unreachable {
        async fn query_names(&self, _: &ObjectNamePattern) -> CollectResult<Vec<ObjectName>> {
            Ok(vec![name("a:type=B")])
        }

        async fn attribute_infos(&self, _: &ObjectName) -> CollectResult<Vec<AttributeInfo>> {
            Err(CollectorError::ConnectionFailed("refused".into()))
        }

        async fn get_attributes(
            &self,
            _: &ObjectName,
            _: &[AttributeInfo],
        ) -> CollectResult<Vec<(String, BeanValue)>> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_connection_failure_aborts() {
        let scraper = Scraper::new(Arc::new(Unreachable), vec![], vec![], AttributeFilter::new());
        let mut receiver = Collecting::default();
        let err = scraper.scrape(&mut receiver).await.unwrap_err();
        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn test_caches_pruned_to_live_beans() {
        let server = Arc::new(LocalBeanServer::new());
        server.register(
            name("a:type=B"),
            StaticBean::new().with_attribute("X", BeanValue::integer(1)),
        );
        let scraper = Scraper::new(server.clone(), vec![], vec![], AttributeFilter::new());

        scraper.scrape(&mut Collecting::default()).await.unwrap();
        assert_eq!(scraper.property_cache().len(), 1);

        server.unregister(&name("a:type=B"));
        scraper.scrape(&mut Collecting::default()).await.unwrap();
        assert!(scraper.property_cache().is_empty());
    }
}
