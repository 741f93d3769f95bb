//! In-memory queue with explicit commits.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tributary_core::error::{Result, TributaryError};
use tributary_core::traits::{QueueConnector, TaskQueue};
use tributary_core::types::{QueueCoords, Task};

/// FIFO queue of tasks recording every commit it receives
///
/// Uncommitted tasks are not redelivered automatically; tests call
/// [`MemoryQueue::push`] again to simulate redelivery.
#[derive(Default)]
pub struct MemoryQueue {
    pending: Mutex<VecDeque<Task>>,
    commits: Mutex<Vec<QueueCoords>>,
    receives: AtomicUsize,
    fail_receives: AtomicUsize,
    fail_commits: AtomicUsize,
    arrivals: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Task) {
        self.pending.lock().push_back(task);
        self.arrivals.notify_one();
    }

    pub fn push_all(&self, tasks: impl IntoIterator<Item = Task>) {
        let mut pending = self.pending.lock();
        pending.extend(tasks);
        drop(pending);
        self.arrivals.notify_one();
    }

    /// Tasks not yet received
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Every committed position, in commit order
    pub fn commits(&self) -> Vec<QueueCoords> {
        self.commits.lock().clone()
    }

    pub fn last_commit(&self) -> Option<QueueCoords> {
        self.commits.lock().last().cloned()
    }

    /// Number of `receive` calls so far, including those that timed out
    pub fn receive_calls(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    /// Fail the next `n` receive calls.
    pub fn fail_next_receives(&self, n: usize) {
        self.fail_receives.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` commit calls.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    fn pop(&self) -> Option<Task> {
        self.pending.lock().pop_front()
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn receive(&self, timeout: Duration) -> Result<Option<Task>> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fail_receives) {
            return Err(TributaryError::Queue("injected receive failure".into()));
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.pop() {
                return Ok(Some(task));
            }
            // A stale wakeup just loops back to the emptiness check.
            if tokio::time::timeout_at(deadline, self.arrivals.notified())
                .await
                .is_err()
            {
                return Ok(self.pop());
            }
        }
    }

    async fn commit(&self, coords: &QueueCoords) -> Result<()> {
        if take_failure(&self.fail_commits) {
            return Err(TributaryError::Queue("injected commit failure".into()));
        }
        self.commits.lock().push(coords.clone());
        Ok(())
    }
}

/// Connector handing the same shared queue to every worker instance
#[derive(Clone)]
pub struct MemoryConnector {
    queue: Arc<MemoryQueue>,
    connections: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(queue: Arc<MemoryQueue>) -> Self {
        Self {
            queue,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `connect` calls so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueConnector for MemoryConnector {
    async fn connect(&self, worker_index: usize) -> Result<Arc<dyn TaskQueue>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(worker_index, "Connected in-memory queue consumer");
        Ok(self.queue.clone())
    }
}
