use crate::shutdown::ShutdownHandle;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tributary_core::types::QueueCoords;

/// What a single worker iteration did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationStats {
    /// Tasks received and accepted for processing
    pub received: usize,
    /// Health-check tasks received and ignored
    pub health_checks: usize,
    /// Whether a flush cycle ran (batch workers only)
    pub flushed: bool,
    /// Tasks covered by the flush cycle
    pub flushed_tasks: usize,
    /// Attempts made by the retried operation, 0 if none ran
    pub attempts: u32,
    /// Position committed at the end of the iteration
    pub committed: Option<QueueCoords>,
    /// The flush cycle exhausted its retries and its data was dropped
    pub abandoned: bool,
}

impl IterationStats {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A queue-draining loop that can be driven one iteration at a time
#[async_trait]
pub trait IngestWorker: Send {
    fn name(&self) -> &str;

    /// Run one iteration. Per-iteration faults are logged, never returned.
    async fn run_once(&mut self) -> IterationStats;

    /// Run iterations until shutdown is signalled.
    ///
    /// A panic inside an iteration aborts only that iteration; uncommitted
    /// tasks are left to the queue's own redelivery.
    async fn run(&mut self, shutdown: ShutdownHandle) {
        tracing::info!(worker = %self.name(), "Worker started");

        while !shutdown.is_shutdown() {
            let result = AssertUnwindSafe(self.run_once()).catch_unwind().await;
            if let Err(panic) = result {
                tracing::error!(
                    worker = %self.name(),
                    panic = %panic_message(panic.as_ref()),
                    "Worker iteration panicked, restarting loop"
                );
            }
        }

        tracing::info!(worker = %self.name(), "Worker stopped");
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
