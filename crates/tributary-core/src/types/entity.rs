use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Project identifier, the tenant unit for quota decisions
pub type ProjectId = u32;

/// Workspace identifier; a workspace owns projects and a billing plan
pub type WorkspaceId = u32;

pub type SessionId = i64;
pub type ErrorGroupId = i64;
pub type ErrorObjectId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub workspace_id: WorkspaceId,
    pub name: String,
}

/// A workspace together with all of its projects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub projects: Vec<Project>,
}

/// Cached per-session key/value field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionField {
    pub name: String,
    pub value: String,
}

/// Full-state session row as stored in the relational store.
///
/// `fields` is empty when read from the relational store and filled in from
/// the cache during identifier sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub secure_id: String,
    pub project_id: ProjectId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub fields: Vec<SessionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub id: ErrorGroupId,
    pub project_id: ProjectId,
    pub event: String,
    pub state: String,
    #[serde(default)]
    pub error_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub id: ErrorObjectId,
    pub project_id: ProjectId,
    pub error_group_id: ErrorGroupId,
    /// Backend errors are not tied to a session
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub event: String,
    pub timestamp: DateTime<Utc>,
}
