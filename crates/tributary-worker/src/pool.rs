use crate::batch::BatchWorker;
use crate::flush::FlushOrchestrator;
use crate::message::MessageWorker;
use crate::shutdown::ShutdownHandle;
use crate::worker::IngestWorker;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tributary_core::error::{Result, TributaryError};
use tributary_core::traits::{MessageHandler, QueueConnector, TaskQueue};
use tributary_core::WorkerConfig;

/// Builds the worker for one pool slot from its queue consumer
pub type WorkerFactory =
    Arc<dyn Fn(usize, Arc<dyn TaskQueue>) -> Box<dyn IngestWorker> + Send + Sync>;

const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Runs `worker_count` instances of one worker kind, each on its own task
/// with its own queue consumer. An instance that exits before shutdown is
/// restarted.
pub struct WorkerPool {
    config: WorkerConfig,
    connector: Arc<dyn QueueConnector>,
    factory: WorkerFactory,
    shutdown: ShutdownHandle,
    restart_delay: Duration,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        connector: Arc<dyn QueueConnector>,
        factory: WorkerFactory,
    ) -> Self {
        Self {
            config,
            connector,
            factory,
            shutdown: ShutdownHandle::new(),
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }

    /// Pool of single-message workers sharing one domain handler.
    pub fn message(
        config: WorkerConfig,
        connector: Arc<dyn QueueConnector>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let base = config.clone();
        let factory: WorkerFactory = Arc::new(move |index, queue| {
            let config = base.clone().with_name(format!("{}-{}", base.name, index));
            Box::new(MessageWorker::new(queue, handler.clone(), config))
        });
        Self::new(config, connector, factory)
    }

    /// Pool of batch workers sharing one flush orchestrator.
    pub fn batch(
        config: WorkerConfig,
        connector: Arc<dyn QueueConnector>,
        flusher: Arc<FlushOrchestrator>,
    ) -> Self {
        let base = config.clone();
        let factory: WorkerFactory = Arc::new(move |index, queue| {
            let config = base.clone().with_name(format!("{}-{}", base.name, index));
            Box::new(BatchWorker::new(queue, flusher.clone(), config))
        });
        Self::new(config, connector, factory)
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run until shutdown is signalled and every instance has stopped.
    ///
    /// Only an invalid configuration is returned as an error.
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;

        tracing::info!(
            worker = %self.config.name,
            count = self.config.worker_count,
            "Starting worker pool"
        );

        let mut running = FuturesUnordered::new();
        for index in 0..self.config.worker_count {
            running.push(self.spawn_instance(index, Duration::ZERO));
        }

        while let Some((index, result)) = running.next().await {
            if self.shutdown.is_shutdown() {
                continue;
            }

            match result {
                Ok(()) => tracing::warn!(worker = %self.config.name, index, "Worker exited"),
                Err(e) => {
                    tracing::error!(worker = %self.config.name, index, error = %e, "Worker failed")
                }
            }
            running.push(self.spawn_instance(index, self.restart_delay));
        }

        tracing::info!(worker = %self.config.name, "Worker pool stopped");
        Ok(())
    }

    fn spawn_instance(
        &self,
        index: usize,
        delay: Duration,
    ) -> BoxFuture<'static, (usize, Result<()>)> {
        let connector = self.connector.clone();
        let factory = self.factory.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let queue = connector.connect(index).await?;
            let mut worker = factory(index, queue);
            worker.run(shutdown).await;
            Ok::<(), TributaryError>(())
        });

        async move {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(TributaryError::Other(e.into())),
            };
            (index, result)
        }
        .boxed()
    }
}
