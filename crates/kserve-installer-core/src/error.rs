//! Error taxonomy for the reconciliation engine.
//!
//! A pass fails with exactly one [`ReconcileError`]. Every variant is
//! transient from the caller's point of view: the runtime requeues with
//! backoff and the next pass re-applies from the first bundle.

use std::time::Duration;

use kserve_stack_api::DescriptorRef;
use thiserror::Error;

use crate::cluster::ClusterError;
use crate::manifest::DecodeError;

/// Failure of a single manifest bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Bundle bytes could not be loaded from their source.
    #[error("failed to load bundle content: {source}")]
    Load {
        #[source]
        source: std::io::Error,
    },

    /// Bundle bytes are not valid UTF-8.
    #[error("bundle is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// A document could not be decoded. `index` counts non-blank documents.
    #[error("failed to decode document {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },

    /// The cluster rejected an object.
    #[error("failed to apply object {kind}/{name}: {source}")]
    Apply {
        kind: String,
        name: String,
        #[source]
        source: ClusterError,
    },
}

/// Failure of a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The descriptor could not be read for a reason other than absence.
    #[error("failed to fetch descriptor {descriptor}: {source}")]
    Fetch {
        descriptor: DescriptorRef,
        #[source]
        source: ClusterError,
    },

    /// A bundle failed; later bundles were not attempted.
    #[error("failed to apply bundle {bundle}: {source}")]
    Bundle {
        bundle: String,
        #[source]
        source: BundleError,
    },

    /// The pass did not finish within the configured deadline.
    #[error("reconciliation pass exceeded its deadline of {after:?}")]
    DeadlineExceeded { after: Duration },
}

impl ReconcileError {
    /// Name of the failing bundle, if the failure happened inside one.
    pub fn bundle(&self) -> Option<&str> {
        match self {
            ReconcileError::Bundle { bundle, .. } => Some(bundle),
            _ => None,
        }
    }
}

/// Result alias for engine operations.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
