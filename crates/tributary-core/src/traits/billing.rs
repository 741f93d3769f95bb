use crate::error::Result;
use crate::types::{ProductType, QuotaUsage, ThresholdBucket, Workspace};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Evaluates a workspace's usage against its billing plan
#[async_trait]
pub trait BillingEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        product: ProductType,
        workspace: &Workspace,
        now: DateTime<Utc>,
    ) -> Result<QuotaUsage>;
}

/// Delivers usage-threshold notifications to a workspace
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        workspace: &Workspace,
        product: ProductType,
        bucket: ThresholdBucket,
    ) -> Result<()>;
}
