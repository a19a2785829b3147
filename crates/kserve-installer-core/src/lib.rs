//! KServe Installer Core
//!
//! Converges a cluster onto the KServe serving stack by server-side applying
//! an ordered catalog of manifest bundles whenever a `KServeStack` changes.
//!
//! ## Key Components
//!
//! - [`Reconciler`]: one pass per trigger, bundles applied in order, fail-fast
//! - [`BundleCatalog`]: injectable, ordered list of named manifest bundles
//! - [`ClusterClient`]: fetch/apply seam, backed by [`KubeCluster`] or
//!   [`fakes::MemoryCluster`]
//! - [`controller`]: watch binding with resync and exponential backoff

pub mod cluster;
pub mod controller;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod kube_cluster;
pub mod manifest;
pub mod metrics;
pub mod obs;
pub mod status;
pub mod telemetry;

pub use cluster::{ApplyOptions, ClusterClient, ClusterError, ClusterResult, DEFAULT_FIELD_MANAGER};
pub use controller::{
    BackoffPolicy, ControllerConfig, ControllerContext, ControllerError, Disposition,
    FailureTracker, DEFAULT_RESYNC_INTERVAL,
};
pub use engine::{BundleReport, EngineConfig, PassReport, ReconcileOutcome, Reconciler};
pub use error::{BundleError, ReconcileError, ReconcileResult};
pub use kube_cluster::KubeCluster;
pub use manifest::{
    decode_bundle, decode_document, inspect_catalog, split_documents, Bundle, BundleCatalog,
    BundleDigest, BundleSource, DecodeError, DecodedBundle, ManifestObject, ObjectKey,
    DEFAULT_BUNDLE_ORDER,
};
pub use metrics::METRICS;
pub use status::{NoopStatusReporter, StatusError, StatusReporter};
pub use telemetry::{init_tracing, LogFormat};

pub use kserve_stack_api::{DescriptorRef, KServeStack, KServeStackSpec, KServeStackStatus};

/// Installer version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
