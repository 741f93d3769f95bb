//! Batching worker
//!
//! Every iteration makes one receive attempt bounded by the flush timeout and
//! then evaluates the flush trigger, so the loop keeps its cadence without
//! traffic: an idle worker still runs an empty flush once per timeout.
//!
//! A flush cycle drains the buffer into typed rows, retries the sub-flushes as
//! a whole with exponential backoff and commits the last buffered position
//! only after an attempt fully succeeds. A cycle that exhausts its attempts is
//! abandoned without committing.

use crate::buffer::{BatchBuffer, DrainedBatch};
use crate::flush::{FlushCycle, FlushOrchestrator};
use crate::worker::{IngestWorker, IterationStats};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tributary_core::observe;
use tributary_core::retry::retry;
use tributary_core::traits::TaskQueue;
use tributary_core::WorkerConfig;

pub struct BatchWorker {
    name: String,
    queue: Arc<dyn TaskQueue>,
    flusher: Arc<FlushOrchestrator>,
    config: WorkerConfig,
    buffer: BatchBuffer,
}

impl BatchWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        flusher: Arc<FlushOrchestrator>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            name: config.name.clone(),
            queue,
            flusher,
            config,
            buffer: BatchBuffer::new(),
        }
    }

    pub fn buffer(&self) -> &BatchBuffer {
        &self.buffer
    }

    fn sampled(&self) -> bool {
        self.buffer
            .last_seen_partition()
            .is_some_and(|partition| partition % self.config.log_sample_modulus.max(1) == 0)
    }

    async fn flush_cycle(&mut self, stats: &mut IterationStats) {
        let started = Instant::now();
        let sampled = self.sampled();

        if sampled {
            tracing::debug!(
                worker = %self.name,
                messages = self.buffer.len(),
                "Flushing messages"
            );
        }

        let drained = self.buffer.drain();
        stats.flushed = true;
        stats.flushed_tasks = drained.tasks;

        if drained.tasks == 0 {
            self.buffer.mark_flushed(Instant::now());
            return;
        }

        let ingest_delay = drained.max_ingest_delay(Utc::now());
        observe::record_ingest_delay(&self.name, ingest_delay);
        if sampled {
            log_classification(&self.name, &drained, ingest_delay);
        }

        let cycle = FlushCycle::new(self.name.clone(), sampled);
        let cycle = &cycle;
        let flusher = &self.flusher;
        let rows = &drained.rows;
        let name = self.name.as_str();

        let outcome = retry(
            &self.config.flush_retry_policy(),
            move |_| flusher.flush(rows, cycle),
            move |attempt, err| {
                tracing::error!(
                    worker = %name,
                    attempt,
                    error = %err,
                    "Batched worker flush failed"
                );
                observe::record_flush_retry(name, attempt);
            },
        )
        .await;
        stats.attempts = outcome.attempts;

        match outcome.result {
            Ok(()) => {
                observe::record_flush(&self.name, started.elapsed(), drained.tasks as u64);
                if let Some(last) = drained.last {
                    match self.queue.commit(&last).await {
                        Ok(()) => {
                            if sampled {
                                tracing::debug!(
                                    worker = %self.name,
                                    partition = last.partition,
                                    offset = last.offset,
                                    "Committed flush cycle"
                                );
                            }
                            stats.committed = Some(last);
                        }
                        Err(e) => {
                            tracing::error!(
                                worker = %self.name,
                                partition = last.partition,
                                offset = last.offset,
                                error = %e,
                                "Failed to commit flush cycle"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    worker = %self.name,
                    attempts = outcome.attempts,
                    tasks = drained.tasks,
                    error = %e,
                    "Flush retries exhausted, abandoning cycle"
                );
                observe::record_cycle_abandoned(&self.name);
                stats.abandoned = true;
            }
        }

        self.buffer.mark_flushed(Instant::now());
    }
}

fn log_classification(worker: &str, drained: &DrainedBatch, ingest_delay: f64) {
    let rows = &drained.rows;
    tracing::debug!(
        worker,
        session_ids = ?rows.session_ids,
        error_group_ids = ?rows.error_group_ids,
        error_object_ids = ?rows.error_object_ids,
        log_rows = rows.logs.len(),
        trace_rows = rows.traces.len(),
        session_events = rows.session_events.len(),
        metric_rows = rows.metrics.len(),
        dropped = drained.dropped,
        max_ingest_delay_secs = ingest_delay,
        "Organized messages"
    );
}

#[async_trait]
impl IngestWorker for BatchWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_once(&mut self) -> IterationStats {
        let mut stats = IterationStats::empty();

        match self.queue.receive(self.config.batch_flush_timeout()).await {
            Ok(Some(task)) if task.is_health_check() => {
                stats.health_checks = 1;
            }
            Ok(Some(task)) => {
                stats.received = 1;
                self.buffer.push(task);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(worker = %self.name, error = %e, "Failed to receive task");
                // Back off on error
                tokio::time::sleep(self.config.min_retry_delay()).await;
            }
        }

        if self.buffer.should_flush(
            Instant::now(),
            self.config.batch_flush_size,
            self.config.batch_flush_timeout(),
        ) {
            self.flush_cycle(&mut stats).await;
        }

        stats
    }
}
