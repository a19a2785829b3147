//! Reconciliation engine.
//!
//! [`Reconciler::reconcile`] runs one pass for a descriptor:
//! 1. fetch the descriptor; absence ends the pass as a stale trigger
//! 2. apply every bundle of the catalog, strictly in order
//! 3. stop at the first bundle that fails and return its error
//!
//! Every apply is a forced server-side apply, so re-running already
//! converged bundles is a no-op and a failed pass is retried from the top.
//! The engine keeps no state between passes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, Instrument};

use kserve_stack_api::DescriptorRef;

use crate::cluster::{ApplyOptions, ClusterClient, DEFAULT_FIELD_MANAGER};
use crate::error::{BundleError, ReconcileError, ReconcileResult};
use crate::manifest::{decode_document, split_documents, Bundle, BundleCatalog, BundleDigest, ObjectKey};
use crate::metrics::METRICS;
use crate::obs;
use crate::status::{NoopStatusReporter, StatusReporter};

/// Engine settings fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Identity that owns every applied field.
    pub field_manager: String,
    /// Upper bound for one pass; `None` leaves it to the caller.
    pub pass_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            pass_timeout: None,
        }
    }
}

/// Objects applied from one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleReport {
    pub name: String,
    pub digest: BundleDigest,
    /// Applied objects in document order.
    pub objects: Vec<ObjectKey>,
}

/// Summary of a converged pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub bundles: Vec<BundleReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PassReport {
    pub fn objects_applied(&self) -> usize {
        self.bundles.iter().map(|b| b.objects.len()).sum()
    }
}

/// Successful outcomes of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every bundle applied; nothing to do until the next trigger.
    Converged(PassReport),
    /// The descriptor no longer exists; the trigger is dropped.
    StaleTrigger,
}

/// Applies the bundle catalog on behalf of a descriptor.
pub struct Reconciler {
    cluster: Arc<dyn ClusterClient>,
    catalog: BundleCatalog,
    config: EngineConfig,
    apply_options: ApplyOptions,
    status: Arc<dyn StatusReporter>,
}

impl Reconciler {
    pub fn new(cluster: Arc<dyn ClusterClient>, catalog: BundleCatalog, config: EngineConfig) -> Self {
        let apply_options = ApplyOptions::forced(config.field_manager.clone());
        Self {
            cluster,
            catalog,
            config,
            apply_options,
            status: Arc::new(NoopStatusReporter),
        }
    }

    /// Replace the default no-op status reporter.
    pub fn with_status_reporter(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    pub fn catalog(&self) -> &BundleCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one reconciliation pass for `descriptor`.
    ///
    /// Dropping the returned future aborts the in-flight cluster call; the
    /// cluster keeps whatever the already-applied prefix produced.
    pub async fn reconcile(&self, descriptor: &DescriptorRef) -> ReconcileResult<ReconcileOutcome> {
        let pass_id = uuid::Uuid::new_v4().to_string();
        let span = obs::pass_span(descriptor, &pass_id);
        self.reconcile_reported(descriptor).instrument(span).await
    }

    async fn reconcile_reported(&self, descriptor: &DescriptorRef) -> ReconcileResult<ReconcileOutcome> {
        METRICS.inc_passes_started();
        obs::emit_pass_started(descriptor, self.catalog.len());
        let started = Instant::now();

        let result = self.bounded_pass(descriptor).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(ReconcileOutcome::Converged(report)) => {
                METRICS.inc_passes_converged();
                obs::emit_pass_converged(
                    descriptor,
                    duration_ms,
                    report.bundles.len(),
                    report.objects_applied(),
                );
                if let Err(e) = self.status.pass_succeeded(descriptor, report).await {
                    obs::emit_status_report_error(descriptor, &e);
                }
            }
            Ok(ReconcileOutcome::StaleTrigger) => {
                METRICS.inc_stale_triggers();
                obs::emit_stale_trigger(descriptor);
            }
            Err(error) => {
                METRICS.inc_passes_failed();
                obs::emit_pass_failed(descriptor, duration_ms, error);
                if let Err(e) = self.status.pass_failed(descriptor, error).await {
                    obs::emit_status_report_error(descriptor, &e);
                }
            }
        }
        result
    }

    async fn bounded_pass(&self, descriptor: &DescriptorRef) -> ReconcileResult<ReconcileOutcome> {
        match self.config.pass_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_pass(descriptor))
                .await
                .map_err(|_| ReconcileError::DeadlineExceeded { after: limit })?,
            None => self.run_pass(descriptor).await,
        }
    }

    async fn run_pass(&self, descriptor: &DescriptorRef) -> ReconcileResult<ReconcileOutcome> {
        let started_at = Utc::now();

        match self.cluster.fetch_descriptor(descriptor).await {
            Ok(stack) => {
                debug!(generation = ?stack.metadata.generation, "descriptor fetched");
            }
            Err(e) if e.is_not_found() => return Ok(ReconcileOutcome::StaleTrigger),
            Err(source) => {
                return Err(ReconcileError::Fetch {
                    descriptor: descriptor.clone(),
                    source,
                })
            }
        }

        let mut bundles = Vec::with_capacity(self.catalog.len());
        for bundle in &self.catalog {
            let report = self.apply_bundle(bundle).await.map_err(|source| {
                obs::emit_bundle_failed(bundle.name(), &source);
                ReconcileError::Bundle {
                    bundle: bundle.name().to_string(),
                    source,
                }
            })?;
            bundles.push(report);
        }

        Ok(ReconcileOutcome::Converged(PassReport {
            bundles,
            started_at,
            finished_at: Utc::now(),
        }))
    }

    /// Apply every document of `bundle` in order.
    ///
    /// Documents are decoded and applied one at a time, so objects ahead of
    /// a malformed document are already applied when the bundle fails. A
    /// bundle without non-blank documents succeeds with no objects.
    pub async fn apply_bundle(&self, bundle: &Bundle) -> Result<BundleReport, BundleError> {
        let raw = bundle
            .source()
            .load()
            .await
            .map_err(|source| BundleError::Load { source })?;
        let digest = BundleDigest::from_bytes(&raw);
        obs::emit_bundle_applying(bundle.name(), &digest);
        let text = std::str::from_utf8(&raw)?;

        let mut objects = Vec::new();
        for (index, doc) in split_documents(text).into_iter().enumerate() {
            let object =
                decode_document(doc).map_err(|source| BundleError::Decode { index, source })?;

            self.cluster
                .apply(&object, &self.apply_options)
                .await
                .map_err(|source| BundleError::Apply {
                    kind: object.kind.clone(),
                    name: object.name.clone(),
                    source,
                })?;

            let key = object.key();
            METRICS.inc_objects_applied();
            obs::emit_object_applied(bundle.name(), &key);
            objects.push(key);
        }

        obs::emit_bundle_applied(bundle.name(), objects.len());
        Ok(BundleReport {
            name: bundle.name().to_string(),
            digest,
            objects,
        })
    }
}
