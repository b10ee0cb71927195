//! Metric snapshots
//!
//! Groups samples by metric name into immutable snapshots, the form handed
//! to exposition formatters.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::SnapshotError;

use super::engine::MetricSample;
use super::rules::MetricType;

/// Label added to every data point of a metric whose label sets collide
pub const BEAN_LABEL: &str = "_bean";

/// Label pairs sorted by name
pub type Labels = Vec<(String, String)>;

/// One labeled value of a metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub labels: Labels,
    pub value: f64,
}

/// All data points sharing one metric name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub data_points: Vec<DataPoint>,
}

impl MetricSnapshot {
    /// Snapshot with a single unlabeled data point
    pub fn single(
        name: impl Into<String>,
        help: impl Into<String>,
        metric_type: MetricType,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            data_points: vec![DataPoint {
                labels: Vec::new(),
                value,
            }],
        }
    }
}

/// Convert samples into snapshots.
///
/// Groups keep the order in which their names first appear. A group whose
/// members share a type keeps it; mixed groups become untyped. When two data
/// points of a group carry identical labels, every point of that group gets a
/// `_bean` label naming its bean.
pub fn convert(samples: &[MetricSample]) -> Result<Vec<MetricSnapshot>, SnapshotError> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&MetricSample>> = HashMap::new();

    for sample in samples {
        let name = sample.rule.name.as_str();
        groups
            .entry(name)
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(sample);
    }

    order
        .into_iter()
        .filter_map(|name| groups.remove(name).map(|group| (name, group)))
        .map(|(name, group)| build_snapshot(name, &group))
        .collect()
}

fn build_snapshot(name: &str, group: &[&MetricSample]) -> Result<MetricSnapshot, SnapshotError> {
    let first = &group[0].rule;
    let metric_type = if group.iter().all(|s| s.rule.metric_type == first.metric_type) {
        first.metric_type
    } else {
        MetricType::Untyped
    };

    let mut points = group
        .iter()
        .map(|sample| {
            Ok(DataPoint {
                labels: labels_of(name, sample)?,
                value: sample.value,
            })
        })
        .collect::<Result<Vec<_>, SnapshotError>>()?;

    if find_duplicate(&points).is_some() {
        for (point, sample) in points.iter_mut().zip(group) {
            if point.labels.iter().any(|(k, _)| k == BEAN_LABEL) {
                return Err(SnapshotError::DuplicateLabelName {
                    metric: name.to_string(),
                    label: BEAN_LABEL.to_string(),
                });
            }
            point
                .labels
                .push((BEAN_LABEL.to_string(), sample.rule.bean_name.clone()));
            point.labels.sort_by(|a, b| a.0.cmp(&b.0));
        }

        if let Some(labels) = find_duplicate(&points) {
            return Err(SnapshotError::DuplicateLabels {
                metric: name.to_string(),
                labels: format_labels(labels),
            });
        }
    }

    Ok(MetricSnapshot {
        name: name.to_string(),
        help: first.help.clone(),
        metric_type,
        data_points: points,
    })
}

fn labels_of(metric: &str, sample: &MetricSample) -> Result<Labels, SnapshotError> {
    let mut labels: Labels = sample
        .rule
        .label_names
        .iter()
        .cloned()
        .zip(sample.rule.label_values.iter().cloned())
        .collect();
    labels.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(pair) = labels.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(SnapshotError::DuplicateLabelName {
            metric: metric.to_string(),
            label: pair[0].0.clone(),
        });
    }
    Ok(labels)
}

fn find_duplicate(points: &[DataPoint]) -> Option<&Labels> {
    let mut seen: HashSet<&Labels> = HashSet::with_capacity(points.len());
    points
        .iter()
        .map(|p| &p.labels)
        .find(|labels| !seen.insert(*labels))
}

fn format_labels(labels: &Labels) -> String {
    let pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}
