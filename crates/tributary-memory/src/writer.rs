//! In-memory analytical store writer.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::time::Instant;
use tributary_core::error::{Result, TributaryError};
use tributary_core::traits::RowWriter;
use tributary_core::types::{
    ErrorGroup, ErrorObject, LogRow, MetricRow, Session, SessionEventRow, TraceRow,
};

/// Writer entry point, used to inject failures and inspect calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Logs,
    Traces,
    SessionEvents,
    Metrics,
    Sessions,
    ErrorGroups,
    ErrorObjects,
}

impl WriteKind {
    fn as_str(&self) -> &'static str {
        match self {
            WriteKind::Logs => "log",
            WriteKind::Traces => "trace",
            WriteKind::SessionEvents => "session event",
            WriteKind::Metrics => "metric",
            WriteKind::Sessions => "session",
            WriteKind::ErrorGroups => "error group",
            WriteKind::ErrorObjects => "error object",
        }
    }
}

#[derive(Default)]
struct Written {
    logs: Vec<LogRow>,
    traces: Vec<TraceRow>,
    session_events: Vec<SessionEventRow>,
    metrics: Vec<MetricRow>,
    sessions: Vec<Session>,
    error_groups: Vec<ErrorGroup>,
    error_objects: Vec<ErrorObject>,
    error_object_sessions: Vec<Session>,
}

/// Row writer keeping every successfully written row in memory
///
/// Each call is recorded with its (virtual) instant whether it succeeds or
/// not, so tests can assert on retry timing.
#[derive(Default)]
pub struct MemoryRowWriter {
    written: Mutex<Written>,
    calls: Mutex<Vec<(WriteKind, Instant)>>,
    failures: Mutex<HashMap<WriteKind, usize>>,
}

impl MemoryRowWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls of one entry point.
    pub fn fail_next(&self, kind: WriteKind, n: usize) {
        self.failures.lock().insert(kind, n);
    }

    /// Instants of every call to one entry point, failed ones included
    pub fn calls(&self, kind: WriteKind) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Entry points called so far, in call order
    pub fn call_sequence(&self) -> Vec<WriteKind> {
        self.calls.lock().iter().map(|(kind, _)| *kind).collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn logs(&self) -> Vec<LogRow> {
        self.written.lock().logs.clone()
    }

    pub fn traces(&self) -> Vec<TraceRow> {
        self.written.lock().traces.clone()
    }

    pub fn session_events(&self) -> Vec<SessionEventRow> {
        self.written.lock().session_events.clone()
    }

    pub fn metrics(&self) -> Vec<MetricRow> {
        self.written.lock().metrics.clone()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.written.lock().sessions.clone()
    }

    pub fn error_groups(&self) -> Vec<ErrorGroup> {
        self.written.lock().error_groups.clone()
    }

    pub fn error_objects(&self) -> Vec<ErrorObject> {
        self.written.lock().error_objects.clone()
    }

    /// Sessions written alongside error objects
    pub fn error_object_sessions(&self) -> Vec<Session> {
        self.written.lock().error_object_sessions.clone()
    }

    fn begin(&self, kind: WriteKind) -> Result<()> {
        self.calls.lock().push((kind, Instant::now()));

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&kind) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TributaryError::sink(kind.as_str(), "injected write failure"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RowWriter for MemoryRowWriter {
    async fn write_log_rows(&self, rows: Vec<LogRow>) -> Result<()> {
        self.begin(WriteKind::Logs)?;
        self.written.lock().logs.extend(rows);
        Ok(())
    }

    async fn write_trace_rows(&self, rows: Vec<TraceRow>) -> Result<()> {
        self.begin(WriteKind::Traces)?;
        self.written.lock().traces.extend(rows);
        Ok(())
    }

    async fn write_session_event_rows(&self, rows: Vec<SessionEventRow>) -> Result<()> {
        self.begin(WriteKind::SessionEvents)?;
        self.written.lock().session_events.extend(rows);
        Ok(())
    }

    async fn write_metric_rows(&self, rows: Vec<MetricRow>) -> Result<()> {
        self.begin(WriteKind::Metrics)?;
        self.written.lock().metrics.extend(rows);
        Ok(())
    }

    async fn write_sessions(&self, sessions: Vec<Session>) -> Result<()> {
        self.begin(WriteKind::Sessions)?;
        self.written.lock().sessions.extend(sessions);
        Ok(())
    }

    async fn write_error_groups(&self, groups: Vec<ErrorGroup>) -> Result<()> {
        self.begin(WriteKind::ErrorGroups)?;
        self.written.lock().error_groups.extend(groups);
        Ok(())
    }

    async fn write_error_objects(
        &self,
        objects: Vec<ErrorObject>,
        sessions: Vec<Session>,
    ) -> Result<()> {
        self.begin(WriteKind::ErrorObjects)?;
        let mut written = self.written.lock();
        written.error_objects.extend(objects);
        written.error_object_sessions.extend(sessions);
        Ok(())
    }
}
