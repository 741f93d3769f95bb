//! Batch buffer and demultiplexer
//!
//! The buffer is owned by exactly one batch worker. Draining it classifies
//! every task into [`TypedRows`] and leaves the buffer empty before any write
//! is attempted; retries of a failed flush work on the typed rows only.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;
use tributary_core::types::{
    ErrorGroupId, ErrorObjectId, LogRow, MetricRow, QueueCoords, SessionEventRow, SessionId,
    Task, TaskPayload, TraceRow,
};

/// Per-cycle typed collections built from the buffered tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedRows {
    pub session_ids: BTreeSet<SessionId>,
    pub error_group_ids: BTreeSet<ErrorGroupId>,
    pub error_object_ids: BTreeSet<ErrorObjectId>,
    pub logs: Vec<LogRow>,
    pub traces: Vec<TraceRow>,
    pub session_events: Vec<SessionEventRow>,
    pub metrics: Vec<MetricRow>,
}

impl TypedRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_identifiers(&self) -> bool {
        !self.session_ids.is_empty()
            || !self.error_group_ids.is_empty()
            || !self.error_object_ids.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_identifiers()
            && self.logs.is_empty()
            && self.traces.is_empty()
            && self.session_events.is_empty()
            && self.metrics.is_empty()
    }

    /// Route one task into its collection.
    ///
    /// Returns `false` when the task kind has no batch destination.
    pub fn push(&mut self, task: Task) -> bool {
        match task.payload {
            TaskPayload::SessionDataSync(sync) => {
                self.session_ids.insert(sync.session_id);
            }
            TaskPayload::ErrorGroupDataSync(sync) => {
                self.error_group_ids.insert(sync.error_group_id);
            }
            TaskPayload::ErrorObjectDataSync(sync) => {
                self.error_object_ids.insert(sync.error_object_id);
            }
            TaskPayload::LogsFlattened(row) | TaskPayload::Logs(row) => self.logs.push(row),
            TaskPayload::TracesFlattened(row) => self.traces.push(row),
            TaskPayload::Traces(span) => self.traces.push(span.into_trace_row()),
            TaskPayload::SessionEvents(row) => self.session_events.push(row),
            TaskPayload::MetricSum(row) => self.metrics.push(MetricRow::Sum(row)),
            TaskPayload::MetricHistogram(row) => self.metrics.push(MetricRow::Histogram(row)),
            TaskPayload::MetricSummary(row) => self.metrics.push(MetricRow::Summary(row)),
            TaskPayload::HealthCheck | TaskPayload::Domain { .. } | TaskPayload::Unknown { .. } => {
                return false
            }
        }
        true
    }
}

/// Result of draining the buffer
#[derive(Debug, Clone, Default)]
pub struct DrainedBatch {
    pub rows: TypedRows,
    /// Number of tasks that were buffered
    pub tasks: usize,
    /// Tasks with no batch destination, dropped during classification
    pub dropped: usize,
    /// Coordinates of the last task appended this cycle
    pub last: Option<QueueCoords>,
    /// Enqueue time of the oldest buffered task
    pub oldest: Option<DateTime<Utc>>,
}

impl DrainedBatch {
    /// Seconds between the oldest buffered task being enqueued and `now`
    pub fn max_ingest_delay(&self, now: DateTime<Utc>) -> f64 {
        self.oldest
            .map(|oldest| (now - oldest).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

pub struct BatchBuffer {
    tasks: Vec<Task>,
    last_flush: Instant,
    last_seen_partition: Option<i32>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            last_flush: Instant::now(),
            last_seen_partition: None,
        }
    }

    pub fn push(&mut self, task: Task) {
        self.last_seen_partition = Some(task.coords.partition);
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn last_flush(&self) -> Instant {
        self.last_flush
    }

    pub fn last_seen_partition(&self) -> Option<i32> {
        self.last_seen_partition
    }

    /// Size or time trigger.
    ///
    /// The time trigger fires once `timeout` has fully elapsed, so a receive
    /// bounded by the same timeout lands exactly on a flush.
    pub fn should_flush(&self, now: Instant, size: usize, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_flush) >= timeout || self.tasks.len() >= size
    }

    pub fn mark_flushed(&mut self, now: Instant) {
        self.last_flush = now;
    }

    /// Classify every buffered task and clear the buffer.
    pub fn drain(&mut self) -> DrainedBatch {
        let tasks = std::mem::take(&mut self.tasks);
        let mut drained = DrainedBatch {
            tasks: tasks.len(),
            ..Default::default()
        };

        for task in tasks {
            let enqueued = task.coords.timestamp;
            if drained.oldest.map_or(true, |oldest| enqueued < oldest) {
                drained.oldest = Some(enqueued);
            }
            drained.last = Some(task.coords.clone());

            let kind = task.kind();
            let (partition, offset) = (task.coords.partition, task.coords.offset);
            if !drained.rows.push(task) {
                tracing::error!(
                    %kind,
                    partition,
                    offset,
                    "Unknown message type received by batch worker, dropping"
                );
                drained.dropped += 1;
            }
        }

        drained
    }
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tributary_core::types::{SessionDataSync, SpanRecord, TaskKind};

    fn coords(offset: i64) -> QueueCoords {
        QueueCoords::new(0, offset)
    }

    fn log_task(offset: i64, project_id: u32) -> Task {
        let row: LogRow = serde_json::from_value(json!({
            "timestamp": "2024-01-01T00:00:00Z",
            "project_id": project_id,
            "body": "hello"
        }))
        .unwrap();
        Task::new(TaskPayload::LogsFlattened(row), coords(offset))
    }

    #[test]
    fn test_drain_classifies_and_clears() {
        let mut buffer = BatchBuffer::new();
        buffer.push(log_task(1, 1));
        buffer.push(Task::new(
            TaskPayload::SessionDataSync(SessionDataSync { session_id: 5 }),
            coords(2),
        ));
        buffer.push(Task::new(
            TaskPayload::SessionDataSync(SessionDataSync { session_id: 5 }),
            coords(3),
        ));
        buffer.push(log_task(4, 2));

        let drained = buffer.drain();

        assert!(buffer.is_empty());
        assert_eq!(drained.tasks, 4);
        assert_eq!(drained.rows.logs.len(), 2);
        assert_eq!(drained.rows.session_ids.len(), 1);
        assert_eq!(drained.last.unwrap().offset, 4);
        assert_eq!(drained.dropped, 0);
    }

    #[test]
    fn test_unknown_and_domain_kinds_are_dropped() {
        let mut buffer = BatchBuffer::new();
        buffer.push(Task::new(
            TaskPayload::Unknown {
                kind: "push-feedback".into(),
            },
            coords(1),
        ));
        buffer.push(Task::new(
            TaskPayload::domain(TaskKind::PushPayload, json!({})).unwrap(),
            coords(2),
        ));

        let drained = buffer.drain();

        assert_eq!(drained.dropped, 2);
        assert!(drained.rows.is_empty());
        // Still counted as the last appended position
        assert_eq!(drained.last.unwrap().offset, 2);
    }

    #[test]
    fn test_legacy_traces_are_flattened() {
        let span: SpanRecord = serde_json::from_value(json!({
            "timestamp": "2024-01-01T00:00:00Z",
            "project_id": 1,
            "trace_id": "t",
            "span_id": "s",
            "attributes": {"db": {"system": "redis"}}
        }))
        .unwrap();

        let mut rows = TypedRows::new();
        assert!(rows.push(Task::new(TaskPayload::Traces(span), coords(1))));
        assert_eq!(rows.traces[0].attributes.get("db.system").unwrap(), "redis");
    }

    #[test]
    fn test_metric_and_session_event_kinds_are_routed() {
        let base = json!({
            "project_id": 3,
            "timestamp": "2024-01-01T00:00:00Z",
            "metric_name": "latency",
            "count": 4,
            "sum": 10.5
        });
        let mut histogram = base.clone();
        histogram["bucket_counts"] = json!([1, 3]);
        histogram["explicit_bounds"] = json!([5.0]);
        let mut summary = base.clone();
        summary["quantiles"] = json!([[0.5, 2.0], [0.99, 4.5]]);
        let mut sum = base;
        sum["value"] = json!(10.5);
        let event = json!({
            "project_id": 3,
            "session_id": 9,
            "session_created_at": "2024-01-01T00:00:00Z",
            "timestamp": "2024-01-01T00:00:01Z",
            "event": "click"
        });

        let mut rows = TypedRows::new();
        for (offset, (kind, payload)) in [
            ("push-metric-histogram", histogram),
            ("push-metric-summary", summary),
            ("push-metric-sum", sum),
            ("push-session-events", event),
        ]
        .into_iter()
        .enumerate()
        {
            let bytes = serde_json::to_vec(&json!({"type": kind, "payload": payload})).unwrap();
            let task = Task::decode(&bytes, coords(offset as i64), 5).unwrap();
            assert!(rows.push(task));
        }

        assert_eq!(rows.metrics.len(), 3);
        match &rows.metrics[0] {
            MetricRow::Histogram(row) => assert_eq!(row.bucket_counts, vec![1, 3]),
            other => panic!("expected histogram, got {:?}", other),
        }
        match &rows.metrics[1] {
            MetricRow::Summary(row) => {
                assert_eq!(row.quantiles, vec![(0.5, 2.0), (0.99, 4.5)])
            }
            other => panic!("expected summary, got {:?}", other),
        }
        assert!(matches!(rows.metrics[2], MetricRow::Sum(_)));
        assert_eq!(rows.session_events.len(), 1);
        assert_eq!(rows.session_events[0].session_id, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_triggers() {
        let timeout = Duration::from_secs(5);
        let mut buffer = BatchBuffer::new();
        let start = Instant::now();

        assert!(!buffer.should_flush(start, 2, timeout));
        buffer.push(log_task(1, 1));
        buffer.push(log_task(2, 1));
        assert!(buffer.should_flush(start, 2, timeout));

        buffer.drain();
        buffer.mark_flushed(start);
        tokio::time::advance(Duration::from_millis(4999)).await;
        assert!(!buffer.should_flush(Instant::now(), 2, timeout));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(buffer.should_flush(Instant::now(), 2, timeout));
    }

    #[test]
    fn test_max_ingest_delay() {
        let mut buffer = BatchBuffer::new();
        let mut early = log_task(1, 1);
        early.coords.timestamp = "2024-01-01T00:00:00Z".parse().unwrap();
        let mut late = log_task(2, 1);
        late.coords.timestamp = "2024-01-01T00:00:05Z".parse().unwrap();
        buffer.push(late);
        buffer.push(early);

        let drained = buffer.drain();
        let now: DateTime<Utc> = "2024-01-01T00:00:10Z".parse().unwrap();
        assert_eq!(drained.max_ingest_delay(now), 10.0);
    }
}
