//! Task model
//!
//! A [`Task`] is one unit of work drawn from the partitioned queue. Its kind is
//! derived from the payload variant, so the two can never disagree.
//!
//! On the wire a task is a JSON envelope:
//!
//! ```json
//! {"type": "push-logs-flattened", "payload": { ... }}
//! ```

use crate::error::{Result, TributaryError};
use crate::types::entity::{ErrorGroupId, ErrorObjectId, SessionId};
use crate::types::rows::{
    LogRow, MetricHistogramRow, MetricSumRow, MetricSummaryRow, SessionEventRow, SpanRecord,
    TraceRow,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Retries granted to a task when the producer does not say otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Position of a task in the partitioned queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueCoords {
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl QueueCoords {
    pub fn new(partition: i32, offset: i64) -> Self {
        Self {
            partition,
            offset,
            key: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Liveness probe: never processed, counted or committed
    HealthCheck,
    PushPayload,
    InitializeSession,
    IdentifySession,
    AddSessionProperties,
    PushBackendPayload,
    MarkBackendSetup,
    SessionDataSync,
    ErrorGroupDataSync,
    ErrorObjectDataSync,
    PushLogsFlattened,
    PushTracesFlattened,
    PushLogs,
    PushTraces,
    PushSessionEvents,
    PushMetricSum,
    PushMetricHistogram,
    PushMetricSummary,
    Unknown,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::HealthCheck => "health-check",
            TaskKind::PushPayload => "push-payload",
            TaskKind::InitializeSession => "initialize-session",
            TaskKind::IdentifySession => "identify-session",
            TaskKind::AddSessionProperties => "add-session-properties",
            TaskKind::PushBackendPayload => "push-backend-payload",
            TaskKind::MarkBackendSetup => "mark-backend-setup",
            TaskKind::SessionDataSync => "session-data-sync",
            TaskKind::ErrorGroupDataSync => "error-group-data-sync",
            TaskKind::ErrorObjectDataSync => "error-object-data-sync",
            TaskKind::PushLogsFlattened => "push-logs-flattened",
            TaskKind::PushTracesFlattened => "push-traces-flattened",
            TaskKind::PushLogs => "push-logs",
            TaskKind::PushTraces => "push-traces",
            TaskKind::PushSessionEvents => "push-session-events",
            TaskKind::PushMetricSum => "push-metric-sum",
            TaskKind::PushMetricHistogram => "push-metric-histogram",
            TaskKind::PushMetricSummary => "push-metric-summary",
            TaskKind::Unknown => "unknown",
        }
    }

    /// Kinds processed one at a time by the domain message handler
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            TaskKind::PushPayload
                | TaskKind::InitializeSession
                | TaskKind::IdentifySession
                | TaskKind::AddSessionProperties
                | TaskKind::PushBackendPayload
                | TaskKind::MarkBackendSetup
        )
    }
}

impl FromStr for TaskKind {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to [`TaskKind::Unknown`].
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let kind = match s {
            "health-check" => TaskKind::HealthCheck,
            "push-payload" => TaskKind::PushPayload,
            "initialize-session" => TaskKind::InitializeSession,
            "identify-session" => TaskKind::IdentifySession,
            "add-session-properties" => TaskKind::AddSessionProperties,
            "push-backend-payload" => TaskKind::PushBackendPayload,
            "mark-backend-setup" => TaskKind::MarkBackendSetup,
            "session-data-sync" => TaskKind::SessionDataSync,
            "error-group-data-sync" => TaskKind::ErrorGroupDataSync,
            "error-object-data-sync" => TaskKind::ErrorObjectDataSync,
            "push-logs-flattened" => TaskKind::PushLogsFlattened,
            "push-traces-flattened" => TaskKind::PushTracesFlattened,
            "push-logs" => TaskKind::PushLogs,
            "push-traces" => TaskKind::PushTraces,
            "push-session-events" => TaskKind::PushSessionEvents,
            "push-metric-sum" => TaskKind::PushMetricSum,
            "push-metric-histogram" => TaskKind::PushMetricHistogram,
            "push-metric-summary" => TaskKind::PushMetricSummary,
            _ => TaskKind::Unknown,
        };
        Ok(kind)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDataSync {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorGroupDataSync {
    pub error_group_id: ErrorGroupId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObjectDataSync {
    pub error_object_id: ErrorObjectId,
}

/// Payload variant, one per task kind
#[derive(Debug, Clone, PartialEq)]
pub enum TaskPayload {
    HealthCheck,
    /// Opaque body for the domain message handler; `kind` is always a domain kind
    Domain {
        kind: TaskKind,
        body: serde_json::Value,
    },
    SessionDataSync(SessionDataSync),
    ErrorGroupDataSync(ErrorGroupDataSync),
    ErrorObjectDataSync(ErrorObjectDataSync),
    LogsFlattened(LogRow),
    TracesFlattened(TraceRow),
    Logs(LogRow),
    Traces(SpanRecord),
    SessionEvents(SessionEventRow),
    MetricSum(MetricSumRow),
    MetricHistogram(MetricHistogramRow),
    MetricSummary(MetricSummaryRow),
    /// A type name this build does not know about
    Unknown {
        kind: String,
    },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::HealthCheck => TaskKind::HealthCheck,
            TaskPayload::Domain { kind, .. } => *kind,
            TaskPayload::SessionDataSync(_) => TaskKind::SessionDataSync,
            TaskPayload::ErrorGroupDataSync(_) => TaskKind::ErrorGroupDataSync,
            TaskPayload::ErrorObjectDataSync(_) => TaskKind::ErrorObjectDataSync,
            TaskPayload::LogsFlattened(_) => TaskKind::PushLogsFlattened,
            TaskPayload::TracesFlattened(_) => TaskKind::PushTracesFlattened,
            TaskPayload::Logs(_) => TaskKind::PushLogs,
            TaskPayload::Traces(_) => TaskKind::PushTraces,
            TaskPayload::SessionEvents(_) => TaskKind::PushSessionEvents,
            TaskPayload::MetricSum(_) => TaskKind::PushMetricSum,
            TaskPayload::MetricHistogram(_) => TaskKind::PushMetricHistogram,
            TaskPayload::MetricSummary(_) => TaskKind::PushMetricSummary,
            TaskPayload::Unknown { .. } => TaskKind::Unknown,
        }
    }

    /// Build a domain payload, rejecting kinds that are not handled one at a time.
    pub fn domain(kind: TaskKind, body: serde_json::Value) -> Result<Self> {
        if !kind.is_domain() {
            return Err(TributaryError::Decode(format!(
                "{} is not a domain task kind",
                kind
            )));
        }
        Ok(TaskPayload::Domain { kind, body })
    }

    fn from_wire(type_name: &str, payload: serde_json::Value) -> Result<Self> {
        let kind = TaskKind::from_str(type_name).unwrap_or(TaskKind::Unknown);

        let decoded = match kind {
            TaskKind::HealthCheck => TaskPayload::HealthCheck,
            TaskKind::PushPayload
            | TaskKind::InitializeSession
            | TaskKind::IdentifySession
            | TaskKind::AddSessionProperties
            | TaskKind::PushBackendPayload
            | TaskKind::MarkBackendSetup => TaskPayload::Domain {
                kind,
                body: payload,
            },
            TaskKind::SessionDataSync => {
                TaskPayload::SessionDataSync(serde_json::from_value(payload)?)
            }
            TaskKind::ErrorGroupDataSync => {
                TaskPayload::ErrorGroupDataSync(serde_json::from_value(payload)?)
            }
            TaskKind::ErrorObjectDataSync => {
                TaskPayload::ErrorObjectDataSync(serde_json::from_value(payload)?)
            }
            TaskKind::PushLogsFlattened => {
                TaskPayload::LogsFlattened(serde_json::from_value(payload)?)
            }
            TaskKind::PushTracesFlattened => {
                TaskPayload::TracesFlattened(serde_json::from_value(payload)?)
            }
            TaskKind::PushLogs => TaskPayload::Logs(serde_json::from_value(payload)?),
            TaskKind::PushTraces => TaskPayload::Traces(serde_json::from_value(payload)?),
            TaskKind::PushSessionEvents => {
                TaskPayload::SessionEvents(serde_json::from_value(payload)?)
            }
            TaskKind::PushMetricSum => TaskPayload::MetricSum(serde_json::from_value(payload)?),
            TaskKind::PushMetricHistogram => {
                TaskPayload::MetricHistogram(serde_json::from_value(payload)?)
            }
            TaskKind::PushMetricSummary => {
                TaskPayload::MetricSummary(serde_json::from_value(payload)?)
            }
            TaskKind::Unknown => TaskPayload::Unknown {
                kind: type_name.to_string(),
            },
        };

        Ok(decoded)
    }

    fn to_wire(&self) -> Result<(String, serde_json::Value)> {
        let body = match self {
            TaskPayload::HealthCheck => serde_json::Value::Null,
            TaskPayload::Domain { body, .. } => body.clone(),
            TaskPayload::SessionDataSync(p) => serde_json::to_value(p)?,
            TaskPayload::ErrorGroupDataSync(p) => serde_json::to_value(p)?,
            TaskPayload::ErrorObjectDataSync(p) => serde_json::to_value(p)?,
            TaskPayload::LogsFlattened(row) | TaskPayload::Logs(row) => serde_json::to_value(row)?,
            TaskPayload::TracesFlattened(row) => serde_json::to_value(row)?,
            TaskPayload::Traces(span) => serde_json::to_value(span)?,
            TaskPayload::SessionEvents(row) => serde_json::to_value(row)?,
            TaskPayload::MetricSum(row) => serde_json::to_value(row)?,
            TaskPayload::MetricHistogram(row) => serde_json::to_value(row)?,
            TaskPayload::MetricSummary(row) => serde_json::to_value(row)?,
            TaskPayload::Unknown { kind } => return Ok((kind.clone(), serde_json::Value::Null)),
        };

        Ok((self.kind().as_str().to_string(), body))
    }
}

#[derive(Deserialize, Serialize)]
struct Envelope {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// One unit of work drawn from the partitioned queue
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub payload: TaskPayload,
    pub coords: QueueCoords,
    /// Failed processing attempts so far
    pub failure_count: u32,
    pub max_retries: u32,
}

impl Task {
    pub fn new(payload: TaskPayload, coords: QueueCoords) -> Self {
        Self {
            payload,
            coords,
            failure_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn health_check(coords: QueueCoords) -> Self {
        Self::new(TaskPayload::HealthCheck, coords)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    pub fn is_health_check(&self) -> bool {
        matches!(self.payload, TaskPayload::HealthCheck)
    }

    /// Attempts left before the task is given up on, counting the next one
    pub fn remaining_attempts(&self) -> u32 {
        self.remaining_attempts_within(self.max_retries)
    }

    /// Like [`Task::remaining_attempts`], with `max_retries` capped at `limit`
    pub fn remaining_attempts_within(&self, limit: u32) -> u32 {
        self.max_retries
            .min(limit)
            .saturating_sub(self.failure_count)
            .saturating_add(1)
    }

    /// Decode a task from its wire envelope.
    ///
    /// Unknown type names decode successfully to [`TaskPayload::Unknown`]; a
    /// known type with a malformed payload is a [`TributaryError::Decode`].
    pub fn decode(bytes: &[u8], coords: QueueCoords, max_retries: u32) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        let payload = TaskPayload::from_wire(&envelope.type_name, envelope.payload)?;
        Ok(Self::new(payload, coords).with_max_retries(max_retries))
    }

    /// Encode the payload into its wire envelope.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (type_name, payload) = self.payload.to_wire()?;
        Ok(serde_json::to_vec(&Envelope { type_name, payload })?)
    }
}
