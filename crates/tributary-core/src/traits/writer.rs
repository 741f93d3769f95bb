use crate::error::Result;
use crate::types::{
    ErrorGroup, ErrorObject, LogRow, MetricRow, Session, SessionEventRow, TraceRow,
};
use async_trait::async_trait;

/// Bulk writer for the analytical store
///
/// Every call is all-or-nothing: an error means none of the rows are durable.
#[async_trait]
pub trait RowWriter: Send + Sync {
    async fn write_log_rows(&self, rows: Vec<LogRow>) -> Result<()>;

    async fn write_trace_rows(&self, rows: Vec<TraceRow>) -> Result<()>;

    async fn write_session_event_rows(&self, rows: Vec<SessionEventRow>) -> Result<()>;

    async fn write_metric_rows(&self, rows: Vec<MetricRow>) -> Result<()>;

    /// Upsert the full state of the given sessions.
    async fn write_sessions(&self, sessions: Vec<Session>) -> Result<()>;

    async fn write_error_groups(&self, groups: Vec<ErrorGroup>) -> Result<()>;

    /// Upsert error objects together with the sessions they reference.
    async fn write_error_objects(
        &self,
        objects: Vec<ErrorObject>,
        sessions: Vec<Session>,
    ) -> Result<()>;
}
