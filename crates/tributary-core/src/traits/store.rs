use crate::error::Result;
use crate::types::{
    BackendSetupKind, ErrorGroup, ErrorGroupId, ErrorObject, ErrorObjectId, Project, ProjectId,
    Session, SessionId, Workspace, WorkspaceId,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Largest id list passed to a single `*_by_ids` query
pub const MAX_IDS_PER_QUERY: usize = 500;

/// Relational store holding the authoritative state of entities
///
/// Callers never pass more than [`MAX_IDS_PER_QUERY`] ids per lookup.
/// Missing ids are silently absent from the result.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn sessions_by_ids(&self, ids: &[SessionId]) -> Result<Vec<Session>>;

    async fn error_groups_by_ids(&self, ids: &[ErrorGroupId]) -> Result<Vec<ErrorGroup>>;

    async fn error_objects_by_ids(&self, ids: &[ErrorObjectId]) -> Result<Vec<ErrorObject>>;

    async fn project(&self, id: ProjectId) -> Result<Option<Project>>;

    async fn workspace_with_projects(&self, id: WorkspaceId) -> Result<Option<Workspace>>;

    /// Create or refresh a service record for a project.
    async fn upsert_service(
        &self,
        project: &Project,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Record that a project has been seen sending backend data.
    async fn mark_backend_setup(&self, project: ProjectId, kind: BackendSetupKind) -> Result<()>;
}
