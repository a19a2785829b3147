//! Convergence reporting extension point.
//!
//! `KServeStackStatus` carries no fields yet, so the engine does not write
//! status itself. Instead it hands the outcome of every non-stale pass to a
//! [`StatusReporter`]. Reporter failures are logged and never change the
//! pass outcome.

use async_trait::async_trait;
use kserve_stack_api::DescriptorRef;
use thiserror::Error;

use crate::engine::PassReport;
use crate::error::ReconcileError;

/// Failure to publish a pass outcome.
#[derive(Debug, Error)]
#[error("status report failed: {0}")]
pub struct StatusError(pub String);

/// Receives the outcome of each reconciliation pass.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn pass_succeeded(
        &self,
        descriptor: &DescriptorRef,
        report: &PassReport,
    ) -> Result<(), StatusError>;

    async fn pass_failed(
        &self,
        descriptor: &DescriptorRef,
        error: &ReconcileError,
    ) -> Result<(), StatusError>;
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatusReporter;

#[async_trait]
impl StatusReporter for NoopStatusReporter {
    async fn pass_succeeded(
        &self,
        _descriptor: &DescriptorRef,
        _report: &PassReport,
    ) -> Result<(), StatusError> {
        Ok(())
    }

    async fn pass_failed(
        &self,
        _descriptor: &DescriptorRef,
        _error: &ReconcileError,
    ) -> Result<(), StatusError> {
        Ok(())
    }
}
