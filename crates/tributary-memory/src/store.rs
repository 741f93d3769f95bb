//! In-memory relational store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tributary_core::error::{Result, TributaryError};
use tributary_core::traits::{RelationalStore, MAX_IDS_PER_QUERY};
use tributary_core::types::{
    BackendSetupKind, ErrorGroup, ErrorGroupId, ErrorObject, ErrorObjectId, Project, ProjectId,
    Session, SessionId, Workspace, WorkspaceId,
};

#[derive(Default)]
struct Tables {
    projects: HashMap<ProjectId, Project>,
    workspaces: HashMap<WorkspaceId, Workspace>,
    sessions: HashMap<SessionId, Session>,
    error_groups: HashMap<ErrorGroupId, ErrorGroup>,
    error_objects: HashMap<ErrorObjectId, ErrorObject>,
    services: Vec<(ProjectId, String)>,
    backend_setups: Vec<(ProjectId, BackendSetupKind)>,
}

#[derive(Default)]
pub struct MemoryRelationalStore {
    tables: Mutex<Tables>,
    id_queries: Mutex<Vec<usize>>,
    fail_project_lookups: AtomicBool,
    fail_services: AtomicBool,
    fail_backend_setups: AtomicUsize,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, project: Project) {
        self.tables.lock().projects.insert(project.id, project);
    }

    /// Insert a workspace together with all of its projects.
    pub fn insert_workspace(&self, workspace: Workspace) {
        let mut tables = self.tables.lock();
        for project in &workspace.projects {
            tables.projects.insert(project.id, project.clone());
        }
        tables.workspaces.insert(workspace.id, workspace);
    }

    pub fn insert_session(&self, session: Session) {
        self.tables.lock().sessions.insert(session.id, session);
    }

    pub fn insert_error_group(&self, group: ErrorGroup) {
        self.tables.lock().error_groups.insert(group.id, group);
    }

    pub fn insert_error_object(&self, object: ErrorObject) {
        self.tables.lock().error_objects.insert(object.id, object);
    }

    /// Services upserted so far, in call order
    pub fn services(&self) -> Vec<(ProjectId, String)> {
        self.tables.lock().services.clone()
    }

    pub fn backend_setups(&self) -> Vec<(ProjectId, BackendSetupKind)> {
        self.tables.lock().backend_setups.clone()
    }

    /// Number of ids passed to each `*_by_ids` call, in call order
    pub fn id_query_sizes(&self) -> Vec<usize> {
        self.id_queries.lock().clone()
    }

    pub fn set_fail_project_lookups(&self, fail: bool) {
        self.fail_project_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_services(&self, fail: bool) {
        self.fail_services.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `mark_backend_setup`.
    pub fn fail_next_backend_setups(&self, n: usize) {
        self.fail_backend_setups.store(n, Ordering::SeqCst);
    }

    fn record_id_query(&self, len: usize) -> Result<()> {
        self.id_queries.lock().push(len);
        if len > MAX_IDS_PER_QUERY {
            return Err(TributaryError::Store(format!(
                "query with {} ids exceeds the limit of {}",
                len, MAX_IDS_PER_QUERY
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn sessions_by_ids(&self, ids: &[SessionId]) -> Result<Vec<Session>> {
        self.record_id_query(ids.len())?;
        let tables = self.tables.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.sessions.get(id).cloned())
            .collect())
    }

    async fn error_groups_by_ids(&self, ids: &[ErrorGroupId]) -> Result<Vec<ErrorGroup>> {
        self.record_id_query(ids.len())?;
        let tables = self.tables.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.error_groups.get(id).cloned())
            .collect())
    }

    async fn error_objects_by_ids(&self, ids: &[ErrorObjectId]) -> Result<Vec<ErrorObject>> {
        self.record_id_query(ids.len())?;
        let tables = self.tables.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.error_objects.get(id).cloned())
            .collect())
    }

    async fn project(&self, id: ProjectId) -> Result<Option<Project>> {
        if self.fail_project_lookups.load(Ordering::SeqCst) {
            return Err(TributaryError::Store("injected project lookup failure".into()));
        }
        Ok(self.tables.lock().projects.get(&id).cloned())
    }

    async fn workspace_with_projects(&self, id: WorkspaceId) -> Result<Option<Workspace>> {
        let tables = self.tables.lock();
        Ok(tables.workspaces.get(&id).map(|workspace| {
            let mut workspace = workspace.clone();
            workspace.projects.sort_by(|a, b| a.name.cmp(&b.name));
            workspace
        }))
    }

    async fn upsert_service(
        &self,
        project: &Project,
        name: &str,
        _attributes: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self.fail_services.load(Ordering::SeqCst) {
            return Err(TributaryError::Store("injected service upsert failure".into()));
        }
        let mut tables = self.tables.lock();
        let key = (project.id, name.to_string());
        if !tables.services.contains(&key) {
            tables.services.push(key);
        }
        Ok(())
    }

    async fn mark_backend_setup(&self, project: ProjectId, kind: BackendSetupKind) -> Result<()> {
        let failed = self
            .fail_backend_setups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TributaryError::Store("injected backend setup failure".into()));
        }
        self.tables.lock().backend_setups.push((project, kind));
        Ok(())
    }
}
