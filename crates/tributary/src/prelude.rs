//! Tributary Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use tributary::prelude::*;
//! ```

// Core types
pub use crate::{QueueCoords, Result, Task, TaskKind, TaskPayload, TributaryError};
pub use crate::types::{
    LogRow, LogSource, MetricRow, Project, ProjectId, ProductType, QuotaUsage, SessionEventRow,
    ThresholdBucket, TraceRow, Workspace, WorkspaceId,
};

// Configs
pub use crate::{BackoffStrategy, RetryPolicy, WorkerConfig};

// Traits
pub use crate::{
    BillingEvaluator, IngestWorker, MessageHandler, Notifier, QueueConnector, QuotaCache,
    RelationalStore, RowWriter, TaskQueue,
};

// Quota
pub use crate::{NotificationDispatcher, QuotaController, QuotaDecisions};

// Workers
pub use crate::{
    BatchWorker, FlushCycle, FlushOrchestrator, IterationStats, MessageWorker, NoiseFilter,
    ShutdownHandle, WorkerPool,
};

// In-memory collaborators
pub use crate::memory::{
    MemoryBillingEvaluator, MemoryConnector, MemoryQuotaCache, MemoryQueue,
    MemoryRelationalStore, MemoryRowWriter, RecordingNotifier, WriteKind,
};
