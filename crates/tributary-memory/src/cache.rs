//! In-memory quota and session-field cache.
//!
//! Entries never expire; expiry belongs to real cache deployments.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tributary_core::error::{Result, TributaryError};
use tributary_core::traits::QuotaCache;
use tributary_core::types::{ProductType, ProjectId, SessionField};

#[derive(Default)]
pub struct MemoryQuotaCache {
    quota: Mutex<HashMap<(ProjectId, ProductType), bool>>,
    session_fields: Mutex<HashMap<String, Vec<SessionField>>>,
    quota_reads: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_session_fields: AtomicBool,
}

impl MemoryQuotaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, project: ProjectId, product: ProductType, exceeded: bool) {
        self.quota.lock().insert((project, product), exceeded);
    }

    pub fn get(&self, project: ProjectId, product: ProductType) -> Option<bool> {
        self.quota.lock().get(&(project, product)).copied()
    }

    pub fn insert_session_fields(&self, secure_id: impl Into<String>, fields: Vec<SessionField>) {
        self.session_fields.lock().insert(secure_id.into(), fields);
    }

    /// Number of `quota_exceeded` calls so far
    pub fn quota_reads(&self) -> usize {
        self.quota_reads.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_session_fields(&self, fail: bool) {
        self.fail_session_fields.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl QuotaCache for MemoryQuotaCache {
    async fn quota_exceeded(
        &self,
        project: ProjectId,
        product: ProductType,
    ) -> Result<Option<bool>> {
        self.quota_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TributaryError::Cache("injected read failure".into()));
        }
        Ok(self.get(project, product))
    }

    async fn set_quota_exceeded(
        &self,
        project: ProjectId,
        product: ProductType,
        exceeded: bool,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TributaryError::Cache("injected write failure".into()));
        }
        self.set(project, product, exceeded);
        Ok(())
    }

    async fn session_fields(&self, secure_id: &str) -> Result<Vec<SessionField>> {
        if self.fail_session_fields.load(Ordering::SeqCst) {
            return Err(TributaryError::Cache("injected session field failure".into()));
        }
        Ok(self
            .session_fields
            .lock()
            .get(secure_id)
            .cloned()
            .unwrap_or_default())
    }
}
