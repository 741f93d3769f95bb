use crate::error::Result;
use crate::types::{QueueCoords, Task};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Consumer side of the partitioned queue
///
/// Offsets are committed explicitly: a committed position means every task at
/// or before it on that partition has been fully processed.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Receive the next task, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the deadline passed with nothing to read.
    async fn receive(&self, timeout: Duration) -> Result<Option<Task>>;

    /// Commit the consumer position up to and including `coords`.
    async fn commit(&self, coords: &QueueCoords) -> Result<()>;
}

/// Hands out one queue consumer per worker instance
#[async_trait]
pub trait QueueConnector: Send + Sync {
    async fn connect(&self, worker_index: usize) -> Result<Arc<dyn TaskQueue>>;
}
