//! Flush orchestrator
//!
//! Sub-flushes run in a fixed order and only for non-empty collections:
//!
//! 1. identifier sync (sessions, error groups, error objects)
//! 2. log rows
//! 3. trace rows
//! 4. session event rows
//! 5. metric rows
//!
//! The first failing sub-flush aborts the rest of the attempt. Quota decisions
//! are memoized on the [`FlushCycle`], so a retried attempt applies exactly the
//! decisions of the first one.

use crate::buffer::TypedRows;
use crate::data_sync::IdentifierSync;
use crate::filter::NoiseFilter;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tributary_core::error::Result;
use tributary_core::observe;
use tributary_core::traits::{QuotaCache, RelationalStore, RowWriter};
use tributary_core::types::{
    BackendSetupKind, LogRow, LogSource, ProductType, Project, ProjectId, TraceRow,
};
use tributary_quota::{QuotaController, QuotaDecisions};

/// State shared by every attempt of one flush cycle
pub struct FlushCycle {
    worker: String,
    sampled: bool,
    /// `None` marks a project evaluated but left undecided
    quota: Mutex<HashMap<(ProjectId, ProductType), Option<bool>>>,
}

impl FlushCycle {
    /// `sampled` enables debug logging for this cycle.
    pub fn new(worker: impl Into<String>, sampled: bool) -> Self {
        Self {
            worker: worker.into(),
            sampled,
            quota: Mutex::new(HashMap::new()),
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn sampled(&self) -> bool {
        self.sampled
    }

    /// Quota decisions for `projects`, evaluating only projects not yet seen
    /// this cycle.
    pub async fn quota_decisions(
        &self,
        controller: &QuotaController,
        projects: &BTreeSet<ProjectId>,
        product: ProductType,
    ) -> Result<QuotaDecisions> {
        let missing: Vec<ProjectId> = {
            let memo = self.quota.lock();
            projects
                .iter()
                .copied()
                .filter(|project| !memo.contains_key(&(*project, product)))
                .collect()
        };

        if !missing.is_empty() {
            let fresh = controller.evaluate(missing.iter().copied(), product).await?;
            let mut memo = self.quota.lock();
            for project in missing {
                memo.insert((project, product), fresh.get(project));
            }
        }

        let memo = self.quota.lock();
        let mut decisions = QuotaDecisions::new();
        for project in projects {
            if let Some(Some(exceeded)) = memo.get(&(*project, product)) {
                decisions.insert(*project, *exceeded);
            }
        }
        Ok(decisions)
    }
}

pub struct FlushOrchestrator {
    writer: Arc<dyn RowWriter>,
    store: Arc<dyn RelationalStore>,
    quota: Arc<QuotaController>,
    sync: IdentifierSync,
    noise: NoiseFilter,
}

impl FlushOrchestrator {
    pub fn new(
        writer: Arc<dyn RowWriter>,
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn QuotaCache>,
        quota: Arc<QuotaController>,
    ) -> Self {
        let sync = IdentifierSync::new(store.clone(), cache, writer.clone());
        Self {
            writer,
            store,
            quota,
            sync,
            noise: NoiseFilter::default(),
        }
    }

    pub fn with_noise_filter(mut self, noise: NoiseFilter) -> Self {
        self.noise = noise;
        self
    }

    /// Run one attempt of the cycle's sub-flushes.
    pub async fn flush(&self, rows: &TypedRows, cycle: &FlushCycle) -> Result<()> {
        if rows.has_identifiers() {
            self.sync.sync(rows, cycle).await?;
        }
        if !rows.logs.is_empty() {
            self.flush_logs(&rows.logs, cycle).await?;
        }
        if !rows.traces.is_empty() {
            self.flush_traces(&rows.traces, cycle).await?;
        }
        if !rows.session_events.is_empty() {
            self.writer
                .write_session_event_rows(rows.session_events.clone())
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to write session events"))?;
        }
        if !rows.metrics.is_empty() {
            self.writer
                .write_metric_rows(rows.metrics.clone())
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to write metrics"))?;
        }
        Ok(())
    }

    async fn flush_logs(&self, rows: &[LogRow], cycle: &FlushCycle) -> Result<()> {
        let mut projects = BTreeSet::new();
        let mut backend = BTreeSet::new();
        let mut services = BTreeMap::new();
        for row in rows {
            projects.insert(row.project_id);
            if !row.service_name.is_empty() {
                services
                    .entry((row.project_id, row.service_name.as_str()))
                    .or_insert(&row.attributes);
            }
            if row.source == LogSource::Backend {
                backend.insert(row.project_id);
            }
        }

        self.upsert_services(services).await;

        let decisions = cycle
            .quota_decisions(&self.quota, &projects, ProductType::Logs)
            .await?;

        let mut survivors: Vec<LogRow> = rows
            .iter()
            .filter(|row| !decisions.is_exceeded(row.project_id))
            .cloned()
            .collect();
        let over_quota = rows.len() - survivors.len();
        let noisy = self.noise.retain(&mut survivors);
        observe::record_rows_filtered(ProductType::Logs, "quota", over_quota as u64);
        observe::record_rows_filtered(ProductType::Logs, "noise", noisy as u64);

        for project in backend {
            self.store
                .mark_backend_setup(project, BackendSetupKind::Logs)
                .await
                .inspect_err(|e| {
                    tracing::error!(project_id = project, error = %e, "Failed to mark backend logs setup")
                })?;
        }

        if cycle.sampled() {
            tracing::debug!(
                worker = %cycle.worker(),
                rows = rows.len(),
                written = survivors.len(),
                over_quota,
                noisy,
                projects = projects.len(),
                "Flushing log rows"
            );
        }

        if survivors.is_empty() {
            return Ok(());
        }

        self.writer
            .write_log_rows(survivors)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to batch write logs"))
    }

    async fn flush_traces(&self, rows: &[TraceRow], cycle: &FlushCycle) -> Result<()> {
        let mut projects = BTreeSet::new();
        let mut backend = BTreeSet::new();
        for row in rows {
            projects.insert(row.project_id);
            // Spans with `http.method` are most likely auto-instrumented frontend requests
            if !row.has_http_method() {
                backend.insert(row.project_id);
            }
        }

        let decisions = cycle
            .quota_decisions(&self.quota, &projects, ProductType::Traces)
            .await?;

        let survivors: Vec<TraceRow> = rows
            .iter()
            .filter(|row| !decisions.is_exceeded(row.project_id))
            .cloned()
            .collect();
        let over_quota = rows.len() - survivors.len();
        observe::record_rows_filtered(ProductType::Traces, "quota", over_quota as u64);

        if cycle.sampled() {
            tracing::debug!(
                worker = %cycle.worker(),
                rows = rows.len(),
                written = survivors.len(),
                over_quota,
                "Flushing trace rows"
            );
        }

        if !survivors.is_empty() {
            self.writer
                .write_trace_rows(survivors)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to batch write traces"))?;
        }

        for project in backend.into_iter().filter(|p| !decisions.is_exceeded(*p)) {
            self.store
                .mark_backend_setup(project, BackendSetupKind::Traces)
                .await
                .inspect_err(|e| {
                    tracing::error!(project_id = project, error = %e, "Failed to mark backend traces setup")
                })?;
        }

        Ok(())
    }

    /// Best-effort: failures are logged and never fail the sub-flush.
    async fn upsert_services(
        &self,
        services: BTreeMap<(ProjectId, &str), &BTreeMap<String, String>>,
    ) {
        let mut projects: HashMap<ProjectId, Option<Project>> = HashMap::new();

        for ((project_id, name), attributes) in services {
            if !projects.contains_key(&project_id) {
                let project = match self.store.project(project_id).await {
                    Ok(project) => project,
                    Err(e) => {
                        tracing::warn!(project_id, error = %e, "Failed to look up project for service");
                        None
                    }
                };
                projects.insert(project_id, project);
            }

            let Some(Some(project)) = projects.get(&project_id) else {
                continue;
            };
            if let Err(e) = self.store.upsert_service(project, name, attributes).await {
                tracing::error!(project_id, service = name, error = %e, "Failed to create service");
            }
        }
    }
}
