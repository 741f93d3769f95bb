//! Identifier sync
//!
//! Tasks of the `*-data-sync` kinds only carry an entity id. The current full
//! state of each entity is read from the relational store in pages of at most
//! [`MAX_IDS_PER_QUERY`] ids, denormalized and upserted into the analytical
//! store.

use crate::buffer::TypedRows;
use crate::flush::FlushCycle;
use std::collections::BTreeSet;
use std::sync::Arc;
use tributary_core::error::Result;
use tributary_core::traits::{QuotaCache, RelationalStore, RowWriter, MAX_IDS_PER_QUERY};
use tributary_core::types::{ErrorGroupId, ErrorObjectId, Session, SessionId};

pub struct IdentifierSync {
    store: Arc<dyn RelationalStore>,
    cache: Arc<dyn QuotaCache>,
    writer: Arc<dyn RowWriter>,
}

impl IdentifierSync {
    pub fn new(
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn QuotaCache>,
        writer: Arc<dyn RowWriter>,
    ) -> Self {
        Self {
            store,
            cache,
            writer,
        }
    }

    /// Sync sessions, then error groups, then error objects. Stops at the first error.
    pub async fn sync(&self, rows: &TypedRows, cycle: &FlushCycle) -> Result<()> {
        if !rows.session_ids.is_empty() {
            self.sync_sessions(&rows.session_ids, cycle).await?;
        }
        if !rows.error_group_ids.is_empty() {
            self.sync_error_groups(&rows.error_group_ids, cycle).await?;
        }
        if !rows.error_object_ids.is_empty() {
            self.sync_error_objects(&rows.error_object_ids, cycle).await?;
        }
        Ok(())
    }

    async fn sync_sessions(&self, ids: &BTreeSet<SessionId>, cycle: &FlushCycle) -> Result<()> {
        if cycle.sampled() {
            tracing::debug!(worker = %cycle.worker(), count = ids.len(), "Flushing sessions");
        }

        let mut sessions = self.fetch_sessions(ids).await?;
        for session in &mut sessions {
            match self.cache.session_fields(&session.secure_id).await {
                Ok(fields) => session.fields = fields,
                Err(e) => {
                    tracing::error!(
                        session_id = session.id,
                        error = %e,
                        "Failed to read session fields"
                    );
                    return Err(e);
                }
            }
        }

        if cycle.sampled() {
            tracing::debug!(
                worker = %cycle.worker(),
                sessions = sessions.len(),
                "Writing sessions"
            );
        }
        self.writer
            .write_sessions(sessions)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to write sessions"))
    }

    async fn sync_error_groups(
        &self,
        ids: &BTreeSet<ErrorGroupId>,
        cycle: &FlushCycle,
    ) -> Result<()> {
        let ids: Vec<ErrorGroupId> = ids.iter().copied().collect();
        let mut groups = Vec::new();
        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            groups.extend(self.store.error_groups_by_ids(chunk).await?);
        }

        if cycle.sampled() {
            tracing::debug!(
                worker = %cycle.worker(),
                error_groups = groups.len(),
                "Writing error groups"
            );
        }
        self.writer
            .write_error_groups(groups)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to write error groups"))
    }

    async fn sync_error_objects(
        &self,
        ids: &BTreeSet<ErrorObjectId>,
        cycle: &FlushCycle,
    ) -> Result<()> {
        let ids: Vec<ErrorObjectId> = ids.iter().copied().collect();
        let mut objects = Vec::new();
        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            objects.extend(self.store.error_objects_by_ids(chunk).await?);
        }

        let session_ids: BTreeSet<SessionId> =
            objects.iter().filter_map(|object| object.session_id).collect();
        let sessions = if session_ids.is_empty() {
            Vec::new()
        } else {
            self.fetch_sessions(&session_ids).await?
        };

        if cycle.sampled() {
            tracing::debug!(
                worker = %cycle.worker(),
                error_objects = objects.len(),
                sessions = sessions.len(),
                "Writing error objects"
            );
        }
        self.writer
            .write_error_objects(objects, sessions)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to write error objects"))
    }

    async fn fetch_sessions(&self, ids: &BTreeSet<SessionId>) -> Result<Vec<Session>> {
        let ids: Vec<SessionId> = ids.iter().copied().collect();
        let mut sessions = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            sessions.extend(self.store.sessions_by_ids(chunk).await?);
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tributary_core::types::{ErrorObject, SessionField};
    use tributary_memory::{MemoryQuotaCache, MemoryRelationalStore, MemoryRowWriter, WriteKind};

    fn session(id: SessionId) -> Session {
        Session {
            id,
            secure_id: format!("secure-{}", id),
            project_id: 1,
            created_at: Utc::now(),
            identifier: String::new(),
            fields: Vec::new(),
        }
    }

    fn error_object(id: ErrorObjectId, session_id: Option<SessionId>) -> ErrorObject {
        ErrorObject {
            id,
            project_id: 1,
            error_group_id: 1,
            session_id,
            event: "TypeError".into(),
            timestamp: Utc::now(),
        }
    }

    struct Fixture {
        store: Arc<MemoryRelationalStore>,
        cache: Arc<MemoryQuotaCache>,
        writer: Arc<MemoryRowWriter>,
        sync: IdentifierSync,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryRelationalStore::new());
        let cache = Arc::new(MemoryQuotaCache::new());
        let writer = Arc::new(MemoryRowWriter::new());
        let sync = IdentifierSync::new(store.clone(), cache.clone(), writer.clone());
        Fixture {
            store,
            cache,
            writer,
            sync,
        }
    }

    #[tokio::test]
    async fn test_sessions_are_chunked_and_denormalized() {
        let f = fixture();
        for id in 0..1200 {
            f.store.insert_session(session(id));
        }
        f.cache.insert_session_fields(
            "secure-7",
            vec![SessionField {
                name: "plan".into(),
                value: "pro".into(),
            }],
        );

        let mut rows = TypedRows::new();
        rows.session_ids.extend(0..1200);
        f.sync.sync(&rows, &FlushCycle::new("test", false)).await.unwrap();

        assert_eq!(f.store.id_query_sizes(), vec![500, 500, 200]);
        let written = f.writer.sessions();
        assert_eq!(written.len(), 1200);
        let seven = written.iter().find(|s| s.id == 7).unwrap();
        assert_eq!(seven.fields[0].value, "pro");
        assert_eq!(f.writer.calls(WriteKind::Sessions).len(), 1);
    }

    #[tokio::test]
    async fn test_session_field_failure_fails_sync() {
        let f = fixture();
        f.store.insert_session(session(1));
        f.cache.set_fail_session_fields(true);

        let mut rows = TypedRows::new();
        rows.session_ids.insert(1);

        assert!(f.sync.sync(&rows, &FlushCycle::new("test", false)).await.is_err());
        assert!(f.writer.calls(WriteKind::Sessions).is_empty());
    }

    #[tokio::test]
    async fn test_error_objects_carry_referenced_sessions() {
        let f = fixture();
        f.store.insert_session(session(10));
        f.store.insert_session(session(11));
        f.store.insert_error_object(error_object(1, Some(10)));
        f.store.insert_error_object(error_object(2, Some(10)));
        f.store.insert_error_object(error_object(3, None));

        let mut rows = TypedRows::new();
        rows.error_object_ids.extend([1, 2, 3]);
        f.sync.sync(&rows, &FlushCycle::new("test", false)).await.unwrap();

        assert_eq!(f.writer.error_objects().len(), 3);
        let sessions = f.writer.error_object_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, 10);
    }

    #[tokio::test]
    async fn test_missing_entities_are_skipped() {
        let f = fixture();
        let mut rows = TypedRows::new();
        rows.error_group_ids.extend([1, 2]);

        f.sync.sync(&rows, &FlushCycle::new("test", false)).await.unwrap();

        assert!(f.writer.error_groups().is_empty());
        assert_eq!(f.writer.calls(WriteKind::ErrorGroups).len(), 1);
    }
}
