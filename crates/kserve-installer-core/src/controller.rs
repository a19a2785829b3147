//! Watch binding: drives the engine from `KServeStack` events.
//!
//! The binding owns all retry policy. The engine only reports outcomes:
//! - converged: requeue after the resync interval to heal drift
//! - stale trigger: drop until the next change
//! - error: requeue with per-descriptor exponential backoff

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client};
use thiserror::Error;
use tracing::{debug, info, warn};

use kserve_stack_api::{DescriptorRef, DescriptorRefError, KServeStack};

use crate::engine::{ReconcileOutcome, Reconciler};
use crate::error::ReconcileError;
use crate::metrics::METRICS;

/// Default periodic resync interval.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(10 * 60 * 60);

/// Exponential retry delay: `base * 2^(failures - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Consecutive failure counts per descriptor.
#[derive(Debug, Default)]
pub struct FailureTracker {
    counts: Mutex<HashMap<DescriptorRef, u32>>,
}

impl FailureTracker {
    /// Record a failure and return the new consecutive count.
    pub fn record_failure(&self, descriptor: &DescriptorRef) -> u32 {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(descriptor.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset(&self, descriptor: &DescriptorRef) {
        self.counts.lock().unwrap().remove(descriptor);
    }

    pub fn failures(&self, descriptor: &DescriptorRef) -> u32 {
        self.counts
            .lock()
            .unwrap()
            .get(descriptor)
            .copied()
            .unwrap_or(0)
    }
}

/// Settings of the watch binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub resync_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// What the runtime should do after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Converged: revisit after the resync interval.
    Resync(Duration),
    /// Stale trigger: wait for the next change event.
    Drop,
    /// Failed: retry after the backoff delay.
    Retry(Duration),
}

impl From<Disposition> for Action {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Resync(after) | Disposition::Retry(after) => Action::requeue(after),
            Disposition::Drop => Action::await_change(),
        }
    }
}

/// Errors surfaced to the controller runtime.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorRefError),

    #[error("reconciliation of {descriptor} failed: {source}")]
    Reconcile {
        descriptor: DescriptorRef,
        #[source]
        source: ReconcileError,
    },
}

/// Shared state handed to every reconcile invocation.
pub struct ControllerContext {
    reconciler: Reconciler,
    failures: FailureTracker,
    config: ControllerConfig,
}

impl ControllerContext {
    pub fn new(reconciler: Reconciler, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            failures: FailureTracker::default(),
            config,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Run one pass and translate its result into a [`Disposition`].
    pub async fn handle(&self, descriptor: &DescriptorRef) -> Result<Disposition, ControllerError> {
        match self.reconciler.reconcile(descriptor).await {
            Ok(ReconcileOutcome::Converged(_)) => {
                self.failures.reset(descriptor);
                Ok(Disposition::Resync(self.config.resync_interval))
            }
            Ok(ReconcileOutcome::StaleTrigger) => {
                self.failures.reset(descriptor);
                Ok(Disposition::Drop)
            }
            Err(source) => Err(ControllerError::Reconcile {
                descriptor: descriptor.clone(),
                source,
            }),
        }
    }

    /// Backoff disposition for a failed pass of `descriptor`.
    pub fn retry(&self, descriptor: Option<&DescriptorRef>) -> Disposition {
        let delay = match descriptor {
            Some(descriptor) => {
                let failures = self.failures.record_failure(descriptor);
                self.config.backoff.delay(failures)
            }
            None => self.config.backoff.max,
        };
        Disposition::Retry(delay)
    }
}

async fn reconcile(obj: Arc<KServeStack>, ctx: Arc<ControllerContext>) -> Result<Action, ControllerError> {
    let descriptor = DescriptorRef::from_resource(obj.as_ref())?;
    ctx.handle(&descriptor).await.map(Action::from)
}

fn error_policy(obj: Arc<KServeStack>, error: &ControllerError, ctx: Arc<ControllerContext>) -> Action {
    let descriptor = DescriptorRef::from_resource(obj.as_ref()).ok();
    let disposition = ctx.retry(descriptor.as_ref());
    if let Disposition::Retry(delay) = disposition {
        warn!(
            error = %error,
            retry_in_ms = delay.as_millis() as u64,
            "reconciliation failed, requeueing with backoff"
        );
    }
    disposition.into()
}

/// Drop the failure count of a descriptor the runtime could no longer find.
///
/// A descriptor deleted while waiting out its backoff never reaches
/// `reconcile` again, so its count would otherwise be kept forever.
fn forget_missing(
    ctx: &ControllerContext,
    error: &controller::Error<ControllerError, watcher::Error>,
) -> bool {
    match error {
        controller::Error::ObjectNotFound(object) => match object.namespace.as_deref() {
            Some(namespace) => {
                ctx.failures.reset(&DescriptorRef::new(namespace, object.name.as_str()));
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// Watch `KServeStack` objects and reconcile them until a shutdown signal.
///
/// `namespace` restricts the watch to one namespace; `None` watches all.
pub async fn run(
    client: Client,
    reconciler: Reconciler,
    namespace: Option<String>,
    config: ControllerConfig,
) {
    let api: Api<KServeStack> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    info!(
        namespace = namespace.as_deref().unwrap_or("*"),
        resync_secs = config.resync_interval.as_secs(),
        "starting KServeStack controller"
    );

    let ctx = Arc::new(ControllerContext::new(reconciler, config));
    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| {
            let ctx = ctx.clone();
            async move {
                match result {
                    Ok((object, action)) => debug!(object = %object, action = ?action, "reconciled"),
                    Err(e) => {
                        if forget_missing(&ctx, &e) {
                            debug!(error = %e, "descriptor gone, failure count cleared");
                        } else {
                            debug!(error = %e, "reconcile request not completed");
                        }
                    }
                }
            }
        })
        .await;

    METRICS.flush();
    info!("KServeStack controller stopped");
}
