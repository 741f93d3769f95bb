//! Tributary: batched, quota-aware ingestion from a partitioned task queue
//!
//! Tributary drains a partitioned, offset-addressed queue of tagged tasks and
//! writes their contents to an analytical store:
//! - Single-message workers run domain handlers with in-place retries
//! - Batch workers accumulate rows and flush them by size or elapsed time
//! - Per-project quota admission drops rows of projects over their plan
//! - Queue positions are committed only after the writes they cover succeed
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tributary::prelude::*;
//!
//! # async fn example() -> tributary::Result<()> {
//! let queue = Arc::new(MemoryQueue::new());
//! let store = Arc::new(MemoryRelationalStore::new());
//! let cache = Arc::new(MemoryQuotaCache::new());
//! let quota = Arc::new(QuotaController::new(
//!     store.clone(),
//!     cache.clone(),
//!     Arc::new(MemoryBillingEvaluator::new()),
//!     NotificationDispatcher::new(Arc::new(RecordingNotifier::new()), 8),
//! ));
//! let flusher = Arc::new(FlushOrchestrator::new(
//!     Arc::new(MemoryRowWriter::new()),
//!     store,
//!     cache,
//!     quota,
//! ));
//!
//! let pool = WorkerPool::batch(
//!     WorkerConfig::new().with_name("logs").with_worker_count(4),
//!     Arc::new(MemoryConnector::new(queue)),
//!     flusher,
//! );
//! pool.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub use tributary_core::{
    config, error, observe, retry, traits, types, BackoffStrategy, BillingEvaluator,
    MessageHandler, Notifier, QueueConnector, QueueCoords, QuotaCache, RelationalStore, Result,
    RetryOutcome, RetryPolicy, RowWriter, Task, TaskKind, TaskPayload, TaskQueue,
    TributaryError, WorkerConfig,
};
pub use tributary_quota::{NotificationDispatcher, QuotaController, QuotaDecisions};
pub use tributary_worker::{
    BatchBuffer, BatchWorker, DrainedBatch, FlushCycle, FlushOrchestrator, IdentifierSync,
    IngestWorker, IterationStats, MessageWorker, NoiseFilter, ShutdownHandle, TypedRows,
    WorkerFactory, WorkerPool,
};

/// In-memory collaborators
pub mod memory {
    pub use tributary_memory::*;
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise logs at `debug` when `verbose` and at
/// `info` otherwise. Does nothing if a subscriber is already installed.
pub fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .try_init();
}
