use crate::error::Result;
use crate::types::{ProductType, ProjectId, SessionField};
use async_trait::async_trait;

/// Shared cache consulted on the hot path
#[async_trait]
pub trait QuotaCache: Send + Sync {
    /// Cached quota decision; `None` when nothing is cached.
    async fn quota_exceeded(&self, project: ProjectId, product: ProductType)
        -> Result<Option<bool>>;

    async fn set_quota_exceeded(
        &self,
        project: ProjectId,
        product: ProductType,
        exceeded: bool,
    ) -> Result<()>;

    /// Fields recorded for a session, looked up by its secure id.
    async fn session_fields(&self, secure_id: &str) -> Result<Vec<SessionField>>;
}
