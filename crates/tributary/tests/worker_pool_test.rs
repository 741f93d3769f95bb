//! Worker pools driven through the in-memory queue

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tributary::prelude::*;

/// Fails the first `failures` attempts of each listed offset.
#[derive(Default)]
struct FlakyHandler {
    failures: Mutex<HashMap<i64, u32>>,
    calls: Mutex<Vec<i64>>,
}

impl FlakyHandler {
    fn failing(offset: i64, failures: u32) -> Self {
        let handler = Self::default();
        handler.failures.lock().insert(offset, failures);
        handler
    }

    fn calls_for(&self, offset: i64) -> usize {
        self.calls.lock().iter().filter(|o| **o == offset).count()
    }
}

#[async_trait]
impl MessageHandler for FlakyHandler {
    async fn handle(&self, task: &Task) -> Result<()> {
        self.calls.lock().push(task.coords.offset);
        if let Some(remaining) = self.failures.lock().get_mut(&task.coords.offset) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TributaryError::Handler("session not found".into()));
            }
        }
        Ok(())
    }
}

fn domain_task(partition: i32, offset: i64) -> Task {
    let payload = TaskPayload::domain(
        TaskKind::InitializeSession,
        json!({"session_secure_id": format!("s-{}", offset)}),
    )
    .unwrap();
    Task::new(payload, QueueCoords::new(partition, offset))
}

fn log_task(offset: i64) -> Task {
    let bytes = serde_json::to_vec(&json!({
        "type": "push-logs",
        "payload": {
            "timestamp": "2024-03-01T12:00:00Z",
            "project_id": 3,
            "body": format!("request {}", offset)
        }
    }))
    .unwrap();
    Task::decode(&bytes, QueueCoords::new(1, offset), 5).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_message_pool_commits_every_task_once() {
    let queue = Arc::new(MemoryQueue::new());
    let handler = Arc::new(FlakyHandler::failing(3, 2));
    queue.push_all([
        domain_task(0, 1),
        Task::health_check(QueueCoords::new(0, 2)),
        domain_task(0, 3),
        domain_task(1, 4),
    ]);

    let config = WorkerConfig::new()
        .with_name("public")
        .with_worker_count(2)
        .with_batch_flush_timeout(Duration::from_secs(1))
        .with_min_retry_delay(Duration::from_millis(10));
    let pool = Arc::new(WorkerPool::message(
        config,
        Arc::new(MemoryConnector::new(queue.clone())),
        handler.clone(),
    ));
    let shutdown = pool.shutdown_handle();
    let running = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run().await }
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown.shutdown();
    running.await.unwrap().unwrap();

    let mut committed: Vec<i64> = queue.commits().iter().map(|c| c.offset).collect();
    committed.sort();
    assert_eq!(committed, vec![1, 3, 4]);
    assert_eq!(handler.calls_for(1), 1);
    assert_eq!(handler.calls_for(3), 3);
    assert_eq!(handler.calls_for(2), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_pool_flushes_by_time() {
    let queue = Arc::new(MemoryQueue::new());
    let store = Arc::new(MemoryRelationalStore::new());
    let cache = Arc::new(MemoryQuotaCache::new());
    cache.set(3, ProductType::Logs, false);
    let writer = Arc::new(MemoryRowWriter::new());
    let quota = Arc::new(QuotaController::new(
        store.clone(),
        cache.clone(),
        Arc::new(MemoryBillingEvaluator::new()),
        NotificationDispatcher::new(Arc::new(RecordingNotifier::new()), 2),
    ));
    let flusher = Arc::new(FlushOrchestrator::new(writer.clone(), store, cache, quota));
    queue.push_all((1..=4).map(log_task));

    let config = WorkerConfig::new()
        .with_name("logs")
        .with_worker_count(1)
        .with_batch_flush_size(100)
        .with_batch_flush_timeout(Duration::from_secs(2));
    let pool = Arc::new(WorkerPool::batch(
        config,
        Arc::new(MemoryConnector::new(queue.clone())),
        flusher,
    ));
    let shutdown = pool.shutdown_handle();
    let running = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run().await }
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    shutdown.shutdown();
    running.await.unwrap().unwrap();

    assert_eq!(writer.logs().len(), 4);
    assert_eq!(queue.last_commit().map(|c| c.offset), Some(4));
}
