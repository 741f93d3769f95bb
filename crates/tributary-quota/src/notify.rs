use std::sync::Arc;
use tokio::sync::Semaphore;
use tributary_core::observe;
use tributary_core::traits::Notifier;
use tributary_core::types::{ProductType, ThresholdBucket, Workspace};

/// Fire-and-forget delivery of usage notifications
///
/// Each notification runs as a detached task. At most `concurrency`
/// notifications are in flight; when the bound is reached new ones are
/// dropped with a warning instead of waiting, so the caller never blocks.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            notifier,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// Submit a notification. Returns `false` if it was dropped.
    pub fn dispatch(
        &self,
        workspace: Workspace,
        product: ProductType,
        bucket: ThresholdBucket,
    ) -> bool {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    workspace_id = workspace.id,
                    %product,
                    %bucket,
                    "Notification capacity exhausted, dropping usage notification"
                );
                observe::record_notification(product, bucket, "dropped");
                return false;
            }
        };

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match notifier.send(&workspace, product, bucket).await {
                Ok(()) => {
                    tracing::info!(
                        workspace_id = workspace.id,
                        %product,
                        %bucket,
                        "Sent usage notification"
                    );
                    observe::record_notification(product, bucket, "sent");
                }
                Err(e) => {
                    tracing::error!(
                        workspace_id = workspace.id,
                        %product,
                        %bucket,
                        error = %e,
                        "Failed to send usage notification"
                    );
                    observe::record_notification(product, bucket, "failed");
                }
            }
        });

        true
    }

    /// Notifications currently being delivered
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_memory::RecordingNotifier;

    fn workspace(id: u32) -> Workspace {
        Workspace {
            id,
            name: format!("ws-{}", id),
            projects: vec![],
        }
    }

    async fn drain(dispatcher: &NotificationDispatcher) {
        while dispatcher.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 4);

        assert!(dispatcher.dispatch(
            workspace(1),
            ProductType::Logs,
            ThresholdBucket::EightyPercent
        ));
        drain(&dispatcher).await;

        assert_eq!(
            notifier.sent(),
            vec![(1, ProductType::Logs, ThresholdBucket::EightyPercent)]
        );
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.set_failing(true);
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 1);

        assert!(dispatcher.dispatch(
            workspace(2),
            ProductType::Traces,
            ThresholdBucket::HundredPercent
        ));
        drain(&dispatcher).await;

        assert!(notifier.sent().is_empty());
        assert_eq!(notifier.attempts(), 1);
    }

    #[tokio::test]
    async fn test_drops_when_capacity_exhausted() {
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 1);

        // Current-thread runtime: the first task cannot run until we yield.
        assert!(dispatcher.dispatch(
            workspace(1),
            ProductType::Logs,
            ThresholdBucket::EightyPercent
        ));
        assert!(!dispatcher.dispatch(
            workspace(2),
            ProductType::Logs,
            ThresholdBucket::EightyPercent
        ));
        drain(&dispatcher).await;

        assert_eq!(notifier.sent().len(), 1);
    }
}
