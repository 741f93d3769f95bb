//! Tributary Core: Types and traits for the tributary ingestion pipeline
//!
//! This crate defines the shared vocabulary of the pipeline:
//! - Task model: tagged tasks drawn from a partitioned queue
//! - Row and entity types written to the analytical store
//! - Collaborator traits: queue, row writer, relational store, cache,
//!   billing evaluator, notifier and domain message handler
//! - Worker configuration and the shared error type
//! - A retry helper with pluggable backoff, used at message and flush-cycle granularity
//! - Optional metrics hooks (`observe` feature)

pub mod config;
pub mod error;
pub mod observe;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::WorkerConfig;
pub use error::{Result, TributaryError};
pub use retry::{retry, BackoffStrategy, RetryOutcome, RetryPolicy};
pub use traits::{
    BillingEvaluator, MessageHandler, Notifier, QueueConnector, QuotaCache, RelationalStore,
    RowWriter, TaskQueue, MAX_IDS_PER_QUERY,
};
pub use types::{
    BackendSetupKind, ErrorGroup, ErrorGroupId, ErrorObject, ErrorObjectId, LogRow, LogSource,
    MetricHistogramRow, MetricRow, MetricSumRow, MetricSummaryRow, Project, ProjectId,
    ProductType, QueueCoords, QuotaUsage, Session, SessionEventRow, SessionField, SessionId,
    SpanRecord, Task, TaskKind, TaskPayload, ThresholdBucket, TraceRow, Workspace, WorkspaceId,
    DEFAULT_MAX_RETRIES,
};
