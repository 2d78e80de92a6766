//! Metric values produced by collectors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How a metric value should be interpreted downstream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MetricKind {
    /// Monotonically increasing value.
    Counter,
    /// Point-in-time value.
    Gauge,
}

/// One collected metric.
///
/// `name` is relative to the collector's domain, e.g. `current` in the
/// `repl.lag` domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    /// Optional provenance, e.g. which replication source produced the value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl MetricValue {
    /// Create a gauge with no metadata.
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Gauge,
            value,
            meta: BTreeMap::new(),
        }
    }

    /// Create a counter with no metadata.
    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self {
            kind: MetricKind::Counter,
            ..Self::gauge(name, value)
        }
    }

    /// Attach a metadata key/value.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_strings() {
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
        assert_eq!("COUNTER".parse::<MetricKind>().unwrap(), MetricKind::Counter);
        assert!("histogram".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_metric_value_builders() {
        let m = MetricValue::gauge("current", 12.0).with_meta("source", "db1");
        assert_eq!(m.kind, MetricKind::Gauge);
        assert_eq!(m.meta.get("source").map(String::as_str), Some("db1"));

        let c = MetricValue::counter("queries", 5.0);
        assert_eq!(c.kind, MetricKind::Counter);
        assert!(c.meta.is_empty());
    }

    #[test]
    fn test_metric_value_json_omits_empty_meta() {
        let json = serde_json::to_value(MetricValue::gauge("current", -1.0)).unwrap();
        assert_eq!(json["kind"], "gauge");
        assert!(json.get("meta").is_none());
    }
}
