//! Structured observability hooks for reconciliation passes.
//!
//! This module provides:
//! - a pass-scoped span via [`pass_span`], attached with `Instrument`
//! - emission functions for pass, bundle and object lifecycle events
//!
//! Failures are logged at `warn!`/`error!` and always name the failing
//! bundle and/or object.

use kserve_stack_api::DescriptorRef;
use tracing::{debug, error, info, warn, Span};

use crate::manifest::{BundleDigest, ObjectKey};

/// Span covering one reconciliation pass.
pub fn pass_span(descriptor: &DescriptorRef, pass_id: &str) -> Span {
    tracing::info_span!(
        "kserve.pass",
        descriptor = %descriptor,
        pass_id = %pass_id,
    )
}

pub fn emit_pass_started(descriptor: &DescriptorRef, bundles: usize) {
    info!(event = "pass.started", descriptor = %descriptor, bundles = bundles);
}

pub fn emit_pass_converged(
    descriptor: &DescriptorRef,
    duration_ms: u64,
    bundles: usize,
    objects: usize,
) {
    info!(
        event = "pass.converged",
        descriptor = %descriptor,
        duration_ms = duration_ms,
        bundles = bundles,
        objects = objects,
        "all manifests applied successfully"
    );
}

pub fn emit_pass_failed(descriptor: &DescriptorRef, duration_ms: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "pass.failed",
        descriptor = %descriptor,
        duration_ms = duration_ms,
        error = %error,
    );
}

/// The descriptor was deleted before the pass could read it.
pub fn emit_stale_trigger(descriptor: &DescriptorRef) {
    info!(event = "pass.stale_trigger", descriptor = %descriptor, "descriptor no longer exists");
}

pub fn emit_bundle_applying(bundle: &str, digest: &BundleDigest) {
    info!(
        event = "bundle.applying",
        bundle = %bundle,
        digest = %digest.short(),
        "applying manifest"
    );
}

pub fn emit_bundle_applied(bundle: &str, objects: usize) {
    debug!(event = "bundle.applied", bundle = %bundle, objects = objects);
}

pub fn emit_bundle_failed(bundle: &str, error: &dyn std::fmt::Display) {
    error!(
        event = "bundle.failed",
        bundle = %bundle,
        error = %error,
        "failed to apply manifest"
    );
}

pub fn emit_object_applied(bundle: &str, object: &ObjectKey) {
    debug!(event = "object.applied", bundle = %bundle, object = %object);
}

pub fn emit_status_report_error(descriptor: &DescriptorRef, error: &dyn std::fmt::Display) {
    warn!(event = "status.report_error", descriptor = %descriptor, error = %error);
}
