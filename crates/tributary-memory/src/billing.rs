//! In-memory billing evaluator and notifier.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tributary_core::error::{Result, TributaryError};
use tributary_core::traits::{BillingEvaluator, Notifier};
use tributary_core::types::{ProductType, QuotaUsage, ThresholdBucket, Workspace, WorkspaceId};

/// Billing evaluator returning configured usage per (workspace, product)
///
/// Workspaces without configured usage are within quota at 0%.
#[derive(Default)]
pub struct MemoryBillingEvaluator {
    usage: Mutex<HashMap<(WorkspaceId, ProductType), QuotaUsage>>,
    evaluations: Mutex<Vec<(WorkspaceId, ProductType)>>,
    failing: AtomicBool,
}

impl MemoryBillingEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_usage(&self, workspace: WorkspaceId, product: ProductType, usage: QuotaUsage) {
        self.usage.lock().insert((workspace, product), usage);
    }

    /// Every evaluation requested, failed ones included
    pub fn evaluations(&self) -> Vec<(WorkspaceId, ProductType)> {
        self.evaluations.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingEvaluator for MemoryBillingEvaluator {
    async fn evaluate(
        &self,
        product: ProductType,
        workspace: &Workspace,
        _now: DateTime<Utc>,
    ) -> Result<QuotaUsage> {
        self.evaluations.lock().push((workspace.id, product));
        if self.failing.load(Ordering::SeqCst) {
            return Err(TributaryError::Billing("injected billing failure".into()));
        }
        Ok(self
            .usage
            .lock()
            .get(&(workspace.id, product))
            .copied()
            .unwrap_or(QuotaUsage {
                within_quota: true,
                percent_used: 0.0,
            }))
    }
}

/// Notifier that records delivered notifications
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(WorkspaceId, ProductType, ThresholdBucket)>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successfully delivered notifications
    pub fn sent(&self) -> Vec<(WorkspaceId, ProductType, ThresholdBucket)> {
        self.sent.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        workspace: &Workspace,
        product: ProductType,
        bucket: ThresholdBucket,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TributaryError::Notification("injected send failure".into()));
        }
        self.sent.lock().push((workspace.id, product, bucket));
        Ok(())
    }
}
