//! Quota admission controller
//!
//! Resolution order for each project:
//! 1. Shared cache: a cached decision is trusted as-is.
//! 2. Cold path: project → owning workspace → workspace with all its
//!    projects → billing evaluation. The decision is written back to the
//!    cache and a notification goes out when a usage threshold is crossed.
//!
//! Lookup failures on either path leave the project undecided, which callers
//! treat as "not exceeded".

use crate::notify::NotificationDispatcher;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tributary_core::error::Result;
use tributary_core::observe;
use tributary_core::traits::{BillingEvaluator, QuotaCache, RelationalStore};
use tributary_core::types::{ProductType, ProjectId, ThresholdBucket, WorkspaceId};

/// Quota decisions for one product, keyed by project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaDecisions {
    exceeded: HashMap<ProjectId, bool>,
}

impl QuotaDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, project: ProjectId, exceeded: bool) {
        self.exceeded.insert(project, exceeded);
    }

    /// Undecided projects are admitted.
    pub fn is_exceeded(&self, project: ProjectId) -> bool {
        self.exceeded.get(&project).copied().unwrap_or(false)
    }

    pub fn get(&self, project: ProjectId) -> Option<bool> {
        self.exceeded.get(&project).copied()
    }

    pub fn contains(&self, project: ProjectId) -> bool {
        self.exceeded.contains_key(&project)
    }

    pub fn len(&self) -> usize {
        self.exceeded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exceeded.is_empty()
    }

    pub fn extend(&mut self, other: QuotaDecisions) {
        self.exceeded.extend(other.exceeded);
    }

    pub fn into_map(self) -> HashMap<ProjectId, bool> {
        self.exceeded
    }
}

pub struct QuotaController {
    store: Arc<dyn RelationalStore>,
    cache: Arc<dyn QuotaCache>,
    billing: Arc<dyn BillingEvaluator>,
    notifications: NotificationDispatcher,
}

impl QuotaController {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn QuotaCache>,
        billing: Arc<dyn BillingEvaluator>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            cache,
            billing,
            notifications,
        }
    }

    /// Decide which of `projects` have exceeded their quota for `product`.
    ///
    /// Only a failure to write a computed decision back to the cache is
    /// returned as an error.
    pub async fn evaluate<I>(&self, projects: I, product: ProductType) -> Result<QuotaDecisions>
    where
        I: IntoIterator<Item = ProjectId>,
    {
        let mut decisions = QuotaDecisions::new();
        let mut cold = Vec::new();

        for project in projects {
            if decisions.contains(project) || cold.contains(&project) {
                continue;
            }

            match self.cache.quota_exceeded(project, product).await {
                Ok(Some(exceeded)) => {
                    observe::record_quota_lookup(product, true);
                    decisions.insert(project, exceeded);
                }
                Ok(None) => {
                    observe::record_quota_lookup(product, false);
                    cold.push(project);
                }
                Err(e) => {
                    tracing::error!(
                        project_id = project,
                        %product,
                        error = %e,
                        "Quota cache read failed, admitting project for this cycle"
                    );
                }
            }
        }

        if !cold.is_empty() {
            self.evaluate_cold(cold, product, &mut decisions).await?;
        }

        Ok(decisions)
    }

    async fn evaluate_cold(
        &self,
        projects: Vec<ProjectId>,
        product: ProductType,
        decisions: &mut QuotaDecisions,
    ) -> Result<()> {
        let mut by_workspace: BTreeMap<WorkspaceId, Vec<ProjectId>> = BTreeMap::new();

        for project_id in projects {
            match self.store.project(project_id).await {
                Ok(Some(project)) => by_workspace
                    .entry(project.workspace_id)
                    .or_default()
                    .push(project_id),
                Ok(None) => {
                    tracing::warn!(project_id, "Project not found while checking quota");
                }
                Err(e) => {
                    tracing::error!(project_id, error = %e, "Error querying project");
                }
            }
        }

        let now = Utc::now();
        for (workspace_id, requested) in by_workspace {
            let workspace = match self.store.workspace_with_projects(workspace_id).await {
                Ok(Some(workspace)) => workspace,
                Ok(None) => {
                    tracing::warn!(workspace_id, "Workspace not found while checking quota");
                    continue;
                }
                Err(e) => {
                    tracing::error!(workspace_id, error = %e, "Error querying workspace");
                    continue;
                }
            };

            let usage = match self.billing.evaluate(product, &workspace, now).await {
                Ok(usage) => usage,
                Err(e) => {
                    tracing::error!(
                        workspace_id,
                        %product,
                        error = %e,
                        "Billing evaluation failed"
                    );
                    continue;
                }
            };

            let exceeded = !usage.within_quota;
            for project_id in requested {
                decisions.insert(project_id, exceeded);
                self.cache
                    .set_quota_exceeded(project_id, product, exceeded)
                    .await?;
            }

            tracing::debug!(
                workspace_id,
                %product,
                exceeded,
                percent_used = usage.percent_used,
                "Evaluated workspace quota"
            );

            if let Some(bucket) = ThresholdBucket::crossed(product, usage.percent_used) {
                self.notifications.dispatch(workspace, product, bucket);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_core::types::{Project, QuotaUsage, Workspace};
    use tributary_memory::{
        MemoryBillingEvaluator, MemoryQuotaCache, MemoryRelationalStore, RecordingNotifier,
    };

    struct Fixture {
        store: Arc<MemoryRelationalStore>,
        cache: Arc<MemoryQuotaCache>,
        billing: Arc<MemoryBillingEvaluator>,
        notifier: Arc<RecordingNotifier>,
        dispatcher: NotificationDispatcher,
        controller: QuotaController,
    }

    fn project(id: ProjectId, workspace_id: WorkspaceId) -> Project {
        Project {
            id,
            workspace_id,
            name: format!("project-{}", id),
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryRelationalStore::new());
        store.insert_workspace(Workspace {
            id: 10,
            name: "acme".into(),
            projects: vec![project(1, 10), project(2, 10)],
        });
        store.insert_workspace(Workspace {
            id: 20,
            name: "globex".into(),
            projects: vec![project(3, 20)],
        });

        let cache = Arc::new(MemoryQuotaCache::new());
        let billing = Arc::new(MemoryBillingEvaluator::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let dispatcher = NotificationDispatcher::new(notifier.clone(), 8);
        let controller = QuotaController::new(
            store.clone(),
            cache.clone(),
            billing.clone(),
            dispatcher.clone(),
        );

        Fixture {
            store,
            cache,
            billing,
            notifier,
            dispatcher,
            controller,
        }
    }

    async fn drain(dispatcher: &NotificationDispatcher) {
        while dispatcher.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_cached_decision_is_trusted() {
        let f = fixture();
        f.cache.set(1, ProductType::Logs, true);
        // Billing would say otherwise; it must not be consulted.
        f.billing.set_usage(
            10,
            ProductType::Logs,
            QuotaUsage {
                within_quota: true,
                percent_used: 0.1,
            },
        );

        let decisions = f.controller.evaluate([1], ProductType::Logs).await.unwrap();

        assert!(decisions.is_exceeded(1));
        assert!(f.billing.evaluations().is_empty());
    }

    #[tokio::test]
    async fn test_cold_path_writes_back_to_cache() {
        let f = fixture();
        f.billing.set_usage(
            20,
            ProductType::Logs,
            QuotaUsage {
                within_quota: false,
                percent_used: 1.2,
            },
        );

        let decisions = f.controller.evaluate([3], ProductType::Logs).await.unwrap();

        assert_eq!(decisions.get(3), Some(true));
        assert_eq!(f.cache.get(3, ProductType::Logs), Some(true));
        assert_eq!(f.billing.evaluations(), vec![(20, ProductType::Logs)]);
    }

    #[tokio::test]
    async fn test_workspace_evaluated_once_for_many_projects() {
        let f = fixture();
        f.billing.set_usage(
            10,
            ProductType::Traces,
            QuotaUsage {
                within_quota: true,
                percent_used: 0.85,
            },
        );

        let decisions = f
            .controller
            .evaluate([1, 2], ProductType::Traces)
            .await
            .unwrap();
        drain(&f.dispatcher).await;

        assert_eq!(decisions.get(1), Some(false));
        assert_eq!(decisions.get(2), Some(false));
        assert_eq!(f.billing.evaluations().len(), 1);
        assert_eq!(
            f.notifier.sent(),
            vec![(10, ProductType::Traces, ThresholdBucket::EightyPercent)]
        );
    }

    #[tokio::test]
    async fn test_only_highest_bucket_notifies() {
        let f = fixture();
        f.billing.set_usage(
            20,
            ProductType::Logs,
            QuotaUsage {
                within_quota: false,
                percent_used: 1.0,
            },
        );

        f.controller.evaluate([3], ProductType::Logs).await.unwrap();
        drain(&f.dispatcher).await;

        assert_eq!(
            f.notifier.sent(),
            vec![(20, ProductType::Logs, ThresholdBucket::HundredPercent)]
        );
    }

    #[tokio::test]
    async fn test_non_log_products_never_notify() {
        let f = fixture();
        f.billing.set_usage(
            20,
            ProductType::Sessions,
            QuotaUsage {
                within_quota: false,
                percent_used: 3.0,
            },
        );

        let decisions = f
            .controller
            .evaluate([3], ProductType::Sessions)
            .await
            .unwrap();
        drain(&f.dispatcher).await;

        assert!(decisions.is_exceeded(3));
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cache_read_failure_fails_open() {
        let f = fixture();
        f.cache.set_fail_reads(true);

        let decisions = f.controller.evaluate([1, 3], ProductType::Logs).await.unwrap();

        assert!(decisions.is_empty());
        assert!(!decisions.is_exceeded(1));
        assert!(f.billing.evaluations().is_empty());
    }

    #[tokio::test]
    async fn test_cold_path_failures_leave_project_undecided() {
        let f = fixture();
        f.billing.set_failing(true);

        let decisions = f.controller.evaluate([1, 99], ProductType::Logs).await.unwrap();

        assert!(decisions.is_empty());
        assert_eq!(f.cache.get(1, ProductType::Logs), None);

        f.billing.set_failing(false);
        f.store.set_fail_project_lookups(true);
        let decisions = f.controller.evaluate([1], ProductType::Logs).await.unwrap();
        assert!(decisions.is_empty());
        // Only the failed evaluation from the first call
        assert_eq!(f.billing.evaluations().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_write_failure_propagates() {
        let f = fixture();
        f.cache.set_fail_writes(true);

        let result = f.controller.evaluate([1], ProductType::Logs).await;

        assert!(result.is_err());
    }
}
