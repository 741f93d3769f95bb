//! Single-message worker
//!
//! Each received task runs through the domain handler with bounded retries
//! and is committed once the final attempt is over, whether it succeeded or
//! not. A task that exhausts its retries is dropped for good.

use crate::worker::{IngestWorker, IterationStats};
use async_trait::async_trait;
use std::sync::Arc;
use tributary_core::observe;
use tributary_core::retry::{retry, RetryPolicy};
use tributary_core::traits::{MessageHandler, TaskQueue};
use tributary_core::types::Task;
use tributary_core::WorkerConfig;

/// Debug logs are emitted only for partitions divisible by this value
const LOG_SAMPLE_MODULUS: i32 = 100;

pub struct MessageWorker {
    name: String,
    queue: Arc<dyn TaskQueue>,
    handler: Arc<dyn MessageHandler>,
    config: WorkerConfig,
}

impl MessageWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        handler: Arc<dyn MessageHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            name: config.name.clone(),
            queue,
            handler,
            config,
        }
    }

    fn sampled(task: &Task) -> bool {
        task.coords.partition % LOG_SAMPLE_MODULUS == 0
    }

    async fn process(&self, task: &mut Task) -> u32 {
        let policy = RetryPolicy::new(
            task.remaining_attempts_within(self.config.message_max_retries),
            self.config.backoff(),
        );
        let handler = &self.handler;
        let name = self.name.as_str();
        let current: &Task = task;
        let kind = current.kind();
        let sampled = Self::sampled(current);

        let outcome = retry(
            &policy,
            move |attempt| {
                if sampled {
                    tracing::debug!(worker = %name, %kind, attempt, "Starting processing");
                }
                handler.handle(current)
            },
            move |attempt, err| {
                tracing::warn!(
                    worker = %name,
                    %kind,
                    partition = current.coords.partition,
                    offset = current.coords.offset,
                    attempt,
                    error = %err,
                    "Task failed"
                );
            },
        )
        .await;

        let attempts = outcome.attempts;
        task.failure_count += outcome.failures();

        match outcome.result {
            Ok(()) => observe::record_message_processed(kind, task.failure_count),
            Err(e) => {
                tracing::error!(
                    worker = %self.name,
                    %kind,
                    partition = task.coords.partition,
                    offset = task.coords.offset,
                    failures = task.failure_count,
                    error = %e,
                    "Task failed permanently, dropping"
                );
                observe::record_message_failure(kind, task.failure_count);
            }
        }

        attempts
    }

    async fn commit(&self, task: &Task, stats: &mut IterationStats) {
        match self.queue.commit(&task.coords).await {
            Ok(()) => {
                if Self::sampled(task) {
                    tracing::debug!(
                        worker = %self.name,
                        partition = task.coords.partition,
                        offset = task.coords.offset,
                        failures = task.failure_count,
                        "Committed"
                    );
                }
                stats.committed = Some(task.coords.clone());
            }
            Err(e) => {
                tracing::error!(
                    worker = %self.name,
                    partition = task.coords.partition,
                    offset = task.coords.offset,
                    error = %e,
                    "Failed to commit task"
                );
            }
        }
    }
}

#[async_trait]
impl IngestWorker for MessageWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_once(&mut self) -> IterationStats {
        let mut stats = IterationStats::empty();

        let mut task = match self.queue.receive(self.config.batch_flush_timeout()).await {
            Ok(Some(task)) => task,
            Ok(None) => return stats,
            Err(e) => {
                tracing::error!(worker = %self.name, error = %e, "Failed to receive task");
                // Back off on error
                tokio::time::sleep(self.config.min_retry_delay()).await;
                return stats;
            }
        };

        if task.is_health_check() {
            stats.health_checks = 1;
            return stats;
        }
        stats.received = 1;

        let kind = task.kind();
        if !kind.is_domain() {
            tracing::error!(
                worker = %self.name,
                %kind,
                partition = task.coords.partition,
                offset = task.coords.offset,
                "Unknown message type received by message worker, dropping"
            );
            observe::record_message_failure(kind, task.failure_count);
            self.commit(&task, &mut stats).await;
            return stats;
        }

        if Self::sampled(&task) {
            tracing::debug!(
                worker = %self.name,
                %kind,
                partition = task.coords.partition,
                offset = task.coords.offset,
                "Received message"
            );
        }

        stats.attempts = self.process(&mut task).await;
        self.commit(&task, &mut stats).await;

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;
    use tributary_core::error::{Result, TributaryError};
    use tributary_core::types::{QueueCoords, SessionDataSync, TaskKind, TaskPayload};
    use tributary_memory::MemoryQueue;

    /// Fails the first `failures` calls, recording every call instant.
    struct ScriptedHandler {
        failures: Mutex<u32>,
        error: fn() -> TributaryError,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedHandler {
        fn failing(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                error: || TributaryError::Handler("store unavailable".into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn poison() -> Self {
            Self {
                failures: Mutex::new(u32::MAX),
                error: || TributaryError::Decode("missing field `events`".into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl MessageHandler for ScriptedHandler {
        async fn handle(&self, _task: &Task) -> Result<()> {
            self.calls.lock().push(Instant::now());
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err((self.error)());
            }
            Ok(())
        }
    }

    fn domain_task(offset: i64, max_retries: u32) -> Task {
        Task::new(
            TaskPayload::domain(TaskKind::PushPayload, json!({"events": []})).unwrap(),
            QueueCoords::new(0, offset),
        )
        .with_max_retries(max_retries)
    }

    fn config() -> WorkerConfig {
        WorkerConfig::new()
            .with_name("public")
            .with_batch_flush_timeout(Duration::from_secs(1))
            .with_min_retry_delay(Duration::from_millis(10))
    }

    fn worker(queue: Arc<MemoryQueue>, handler: Arc<ScriptedHandler>) -> MessageWorker {
        MessageWorker::new(queue, handler, config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_in_place_then_committed_once() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(2));
        queue.push(domain_task(7, 5));
        let mut worker = worker(queue.clone(), handler.clone());

        let stats = worker.run_once().await;

        assert_eq!(stats.attempts, 3);
        assert_eq!(handler.calls(), 3);
        assert_eq!(queue.commits().len(), 1);
        assert_eq!(stats.committed.unwrap().offset, 7);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_task_still_committed() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(100));
        queue.push(domain_task(3, 2));
        let mut worker = worker(queue.clone(), handler.clone());

        let stats = worker.run_once().await;

        // First attempt plus two retries
        assert_eq!(handler.calls(), 3);
        assert_eq!(stats.attempts, 3);
        assert_eq!(queue.commits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prior_failures_reduce_remaining_attempts() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(100));
        let mut task = domain_task(3, 4);
        task.failure_count = 3;
        queue.push(task);
        let mut worker = worker(queue.clone(), handler.clone());

        worker.run_once().await;

        assert_eq!(handler.calls(), 2);
        assert_eq!(queue.commits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poison_message_not_retried() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::poison());
        queue.push(domain_task(9, 5));
        let mut worker = worker(queue.clone(), handler.clone());

        let stats = worker.run_once().await;

        assert_eq!(handler.calls(), 1);
        assert_eq!(stats.committed.unwrap().offset, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_has_no_effects() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(0));
        queue.push(Task::health_check(QueueCoords::new(0, 1)));
        let mut worker = worker(queue.clone(), handler.clone());

        let stats = worker.run_once().await;

        assert_eq!(stats.health_checks, 1);
        assert_eq!(stats.received, 0);
        assert_eq!(handler.calls(), 0);
        assert!(queue.commits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_failure_is_logged_not_fatal() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(0));
        queue.push(domain_task(1, 0));
        queue.fail_next_commits(1);
        let mut worker = worker(queue.clone(), handler);

        let stats = worker.run_once().await;

        assert!(stats.committed.is_none());
        assert!(queue.commits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_receive_is_a_quiet_iteration() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(0));
        let mut worker = worker(queue, handler);

        assert_eq!(worker.run_once().await, IterationStats::empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_retries_cap_task_retries() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(100));
        queue.push(domain_task(5, 5));
        let mut worker = MessageWorker::new(
            queue.clone(),
            handler.clone(),
            config().with_message_max_retries(1),
        );

        let stats = worker.run_once().await;

        assert_eq!(handler.calls(), 2);
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.committed.unwrap().offset, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_domain_kinds_skip_handler_and_commit() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(0));
        queue.push(Task::new(
            TaskPayload::Unknown {
                kind: "push-feedback".into(),
            },
            QueueCoords::new(0, 21),
        ));
        queue.push(Task::new(
            TaskPayload::SessionDataSync(SessionDataSync { session_id: 4 }),
            QueueCoords::new(0, 22),
        ));
        let mut worker = worker(queue.clone(), handler.clone());

        let first = worker.run_once().await;
        let second = worker.run_once().await;

        assert_eq!(handler.calls(), 0);
        assert_eq!(first.attempts, 0);
        assert_eq!(first.committed.unwrap().offset, 21);
        assert_eq!(second.committed.unwrap().offset, 22);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_error_backs_off() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(ScriptedHandler::failing(0));
        queue.fail_next_receives(1);
        queue.push(domain_task(2, 5));
        let mut worker = worker(queue.clone(), handler.clone());
        let start = Instant::now();

        let failed = worker.run_once().await;

        assert_eq!(failed, IterationStats::empty());
        assert_eq!(start.elapsed(), Duration::from_millis(10));
        assert_eq!(handler.calls(), 0);

        let stats = worker.run_once().await;
        assert_eq!(stats.committed.unwrap().offset, 2);
        assert_eq!(handler.calls(), 1);
    }
}
