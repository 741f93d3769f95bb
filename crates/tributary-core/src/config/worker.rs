use crate::error::{Result, TributaryError};
use crate::retry::{BackoffStrategy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for ingestion workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker name, used in logs and metric labels
    /// Default: "batch"
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of buffered tasks that triggers a flush
    /// Default: 10000
    #[serde(default = "default_batch_flush_size")]
    pub batch_flush_size: usize,

    /// Maximum time between flushes, also the receive deadline (milliseconds)
    /// Default: 5000ms
    #[serde(default = "default_batch_flush_timeout_ms")]
    pub batch_flush_timeout_ms: u64,

    /// Number of worker instances in a pool
    /// Default: 4
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Retries granted to a single message after its first attempt; caps the
    /// task's own `max_retries`
    /// Default: 5
    #[serde(default = "default_message_max_retries")]
    pub message_max_retries: u32,

    /// Retries granted to a whole flush cycle after its first attempt
    /// Default: 5
    #[serde(default = "default_flush_max_retries")]
    pub flush_max_retries: u32,

    /// Base delay of the exponential retry backoff (milliseconds)
    /// Default: 250ms
    #[serde(default = "default_min_retry_delay_ms")]
    pub min_retry_delay_ms: u64,

    /// Upper bound of the retry backoff (milliseconds)
    /// Default: 60000ms
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Maximum number of quota notifications in flight
    /// Default: 16
    #[serde(default = "default_notification_concurrency")]
    pub notification_concurrency: usize,

    /// Debug logs are only emitted for partitions divisible by this value
    /// Default: 10
    #[serde(default = "default_log_sample_modulus")]
    pub log_sample_modulus: i32,
}

fn default_name() -> String {
    "batch".to_string()
}

fn default_batch_flush_size() -> usize {
    10_000
}

fn default_batch_flush_timeout_ms() -> u64 {
    5_000
}

fn default_worker_count() -> usize {
    4
}

fn default_message_max_retries() -> u32 {
    5
}

fn default_flush_max_retries() -> u32 {
    5
}

fn default_min_retry_delay_ms() -> u64 {
    250
}

fn default_max_retry_delay_ms() -> u64 {
    60_000
}

fn default_notification_concurrency() -> usize {
    16
}

fn default_log_sample_modulus() -> i32 {
    10
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            batch_flush_size: default_batch_flush_size(),
            batch_flush_timeout_ms: default_batch_flush_timeout_ms(),
            worker_count: default_worker_count(),
            message_max_retries: default_message_max_retries(),
            flush_max_retries: default_flush_max_retries(),
            min_retry_delay_ms: default_min_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            notification_concurrency: default_notification_concurrency(),
            log_sample_modulus: default_log_sample_modulus(),
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_flush_size(mut self, size: usize) -> Self {
        self.batch_flush_size = size;
        self
    }

    pub fn with_batch_flush_timeout(mut self, timeout: Duration) -> Self {
        self.batch_flush_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_message_max_retries(mut self, retries: u32) -> Self {
        self.message_max_retries = retries;
        self
    }

    pub fn with_flush_max_retries(mut self, retries: u32) -> Self {
        self.flush_max_retries = retries;
        self
    }

    pub fn with_min_retry_delay(mut self, delay: Duration) -> Self {
        self.min_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_notification_concurrency(mut self, concurrency: usize) -> Self {
        self.notification_concurrency = concurrency;
        self
    }

    pub fn with_log_sample_modulus(mut self, modulus: i32) -> Self {
        self.log_sample_modulus = modulus;
        self
    }

    pub fn batch_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_flush_timeout_ms)
    }

    pub fn min_retry_delay(&self) -> Duration {
        Duration::from_millis(self.min_retry_delay_ms)
    }

    pub fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::Exponential {
            initial: Duration::from_millis(self.min_retry_delay_ms),
            max: Duration::from_millis(self.max_retry_delay_ms),
        }
    }

    /// Retry policy for a whole flush cycle: the first attempt plus `flush_max_retries`.
    pub fn flush_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.flush_max_retries.saturating_add(1), self.backoff())
    }

    /// Reject configurations that would stall or spin a worker loop.
    pub fn validate(&self) -> Result<()> {
        if self.batch_flush_size == 0 {
            return Err(TributaryError::Config(
                "batch_flush_size must be greater than zero".into(),
            ));
        }
        if self.batch_flush_timeout_ms == 0 {
            return Err(TributaryError::Config(
                "batch_flush_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.worker_count == 0 {
            return Err(TributaryError::Config(
                "worker_count must be greater than zero".into(),
            ));
        }
        if self.notification_concurrency == 0 {
            return Err(TributaryError::Config(
                "notification_concurrency must be greater than zero".into(),
            ));
        }
        if self.log_sample_modulus <= 0 {
            return Err(TributaryError::Config(
                "log_sample_modulus must be positive".into(),
            ));
        }
        Ok(())
    }
}
