//! Rows written to the analytical store.

use crate::types::entity::{ProjectId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    #[default]
    Frontend,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: DateTime<Utc>,
    pub project_id: ProjectId,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub secure_session_id: String,
    #[serde(default)]
    pub severity_text: String,
    pub body: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub service_version: String,
    #[serde(default)]
    pub source: LogSource,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    pub timestamp: DateTime<Utc>,
    pub project_id: ProjectId,
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: String,
    #[serde(default)]
    pub span_name: String,
    #[serde(default)]
    pub span_kind: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub duration_ns: i64,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub secure_session_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl TraceRow {
    /// Spans carrying `http.method` are most likely auto-instrumented browser requests.
    pub fn has_http_method(&self) -> bool {
        self.attributes.contains_key("http.method")
    }
}

/// Span in the older nested shape, where attributes may hold nested objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub timestamp: DateTime<Utc>,
    pub project_id: ProjectId,
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: String,
    #[serde(default)]
    pub span_name: String,
    #[serde(default)]
    pub span_kind: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub duration_ns: i64,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub secure_session_id: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl SpanRecord {
    /// Flatten nested attributes into dotted keys.
    pub fn into_trace_row(self) -> TraceRow {
        let mut attributes = BTreeMap::new();
        flatten_attributes("", &self.attributes, &mut attributes);

        TraceRow {
            timestamp: self.timestamp,
            project_id: self.project_id,
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            span_name: self.span_name,
            span_kind: self.span_kind,
            service_name: self.service_name,
            duration_ns: self.duration_ns,
            status_code: self.status_code,
            secure_session_id: self.secure_session_id,
            attributes,
        }
    }
}

fn flatten_attributes(
    prefix: &str,
    map: &serde_json::Map<String, serde_json::Value>,
    out: &mut BTreeMap<String, String>,
) {
    for (key, value) in map {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            serde_json::Value::Object(nested) => flatten_attributes(&key, nested, out),
            serde_json::Value::String(s) => {
                out.insert(key, s.clone());
            }
            serde_json::Value::Null => {}
            other => {
                out.insert(key, other.to_string());
            }
        }
    }
}

/// One user-interaction event recorded during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEventRow {
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub session_created_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSumRow {
    pub project_id: ProjectId,
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricHistogramRow {
    pub project_id: ProjectId,
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub count: u64,
    pub sum: f64,
    #[serde(default)]
    pub bucket_counts: Vec<u64>,
    #[serde(default)]
    pub explicit_bounds: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummaryRow {
    pub project_id: ProjectId,
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub count: u64,
    pub sum: f64,
    /// (quantile, value) pairs
    #[serde(default)]
    pub quantiles: Vec<(f64, f64)>,
}

/// Metric sample of any of the three supported shapes
#[derive(Debug, Clone, PartialEq)]
pub enum MetricRow {
    Sum(MetricSumRow),
    Histogram(MetricHistogramRow),
    Summary(MetricSummaryRow),
}

impl MetricRow {
    pub fn project_id(&self) -> ProjectId {
        match self {
            MetricRow::Sum(row) => row.project_id,
            MetricRow::Histogram(row) => row.project_id,
            MetricRow::Summary(row) => row.project_id,
        }
    }

    pub fn metric_name(&self) -> &str {
        match self {
            MetricRow::Sum(row) => &row.metric_name,
            MetricRow::Histogram(row) => &row.metric_name,
            MetricRow::Summary(row) => &row.metric_name,
        }
    }
}
