pub mod entity;
pub mod quota;
pub mod rows;
pub mod task;

pub use entity::{
    ErrorGroup, ErrorGroupId, ErrorObject, ErrorObjectId, Project, ProjectId, Session,
    SessionField, SessionId, Workspace, WorkspaceId,
};
pub use quota::{BackendSetupKind, ProductType, QuotaUsage, ThresholdBucket};
pub use rows::{
    LogRow, LogSource, MetricHistogramRow, MetricRow, MetricSumRow, MetricSummaryRow,
    SessionEventRow, SpanRecord, TraceRow,
};
pub use task::{
    ErrorGroupDataSync, ErrorObjectDataSync, QueueCoords, SessionDataSync, Task, TaskKind,
    TaskPayload, DEFAULT_MAX_RETRIES,
};
