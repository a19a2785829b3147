//! Cluster-apply capability consumed by the engine.
//!
//! [`ClusterClient`] is the only seam between the engine and the cluster's
//! object store:
//! - `fetch_descriptor`: read a `KServeStack`, absence is a distinguished
//!   [`ClusterError::NotFound`]
//! - `apply`: server-side apply of one object under a field manager
//!
//! [`crate::kube_cluster::KubeCluster`] talks to a real API server; the
//! in-memory [`crate::fakes::MemoryCluster`] backs the tests.

use async_trait::async_trait;
use kserve_stack_api::{DescriptorRef, KServeStack};
use thiserror::Error;

use crate::manifest::ManifestObject;

/// Field manager used when none is configured.
pub const DEFAULT_FIELD_MANAGER: &str = "kserve-installer";

/// Errors returned by a [`ClusterClient`].
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The requested object does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// The API server refused the request (validation, RBAC, conflict...).
    #[error("rejected by API server ({code} {reason}): {message}")]
    Rejected {
        code: u16,
        reason: String,
        message: String,
    },

    /// The object's group/version/kind is not served by the cluster.
    #[error("cannot resolve {api_version} {kind}: {message}")]
    Discovery {
        api_version: String,
        kind: String,
        message: String,
    },

    /// A namespaced kind was given without `metadata.namespace`.
    #[error("{kind} {name} is namespaced but has no namespace")]
    NamespaceRequired { kind: String, name: String },

    /// Connection, serialization or other client-side failure.
    #[error("cluster request failed: {0}")]
    Transport(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Result type for cluster operations.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Options for a server-side apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Identity under which the applied fields are owned.
    pub field_manager: String,
    /// Take ownership of fields held by other managers instead of failing.
    pub force: bool,
}

impl ApplyOptions {
    /// Forced apply under `field_manager`.
    pub fn forced(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
            force: true,
        }
    }
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self::forced(DEFAULT_FIELD_MANAGER)
    }
}

/// Read/apply access to the cluster's object store.
///
/// Implementations must make `apply` an idempotent upsert: applying the same
/// object twice leaves the store as a single apply would.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch the descriptor. Returns `ClusterError::NotFound` if it is absent.
    async fn fetch_descriptor(&self, descriptor: &DescriptorRef) -> ClusterResult<KServeStack>;

    /// Server-side apply `object`.
    async fn apply(&self, object: &ManifestObject, options: &ApplyOptions) -> ClusterResult<()>;
}
