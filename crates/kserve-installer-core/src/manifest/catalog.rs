//! Ordered catalog of manifest bundles.
//!
//! The catalog is injected into the engine at construction time. Its order
//! is the apply order: later bundles may rely on namespaces, CRDs and RBAC
//! created by earlier ones, so it is never reordered at runtime.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bundle names of the default stack, in apply order.
pub const DEFAULT_BUNDLE_ORDER: [&str; 6] = [
    "namespaces.yaml",               // required namespaces
    "knative-rbac.yaml",             // Knative operator permissions
    "kserve.yaml",                   // KServe control plane (CRDs + controller)
    "istio.yaml",                    // Istio via the Sail operator
    "knative-serving.yaml",          // Knative Serving via the Knative operator
    "kserve-cluster-resources.yaml", // default serving runtimes
];

static EMBEDDED_BUNDLES: [(&str, &[u8]); 6] = [
    (
        "namespaces.yaml",
        include_bytes!("../../manifests/namespaces.yaml"),
    ),
    (
        "knative-rbac.yaml",
        include_bytes!("../../manifests/knative-rbac.yaml"),
    ),
    ("kserve.yaml", include_bytes!("../../manifests/kserve.yaml")),
    ("istio.yaml", include_bytes!("../../manifests/istio.yaml")),
    (
        "knative-serving.yaml",
        include_bytes!("../../manifests/knative-serving.yaml"),
    ),
    (
        "kserve-cluster-resources.yaml",
        include_bytes!("../../manifests/kserve-cluster-resources.yaml"),
    ),
];

/// SHA-256 of a bundle's raw bytes (lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleDigest(String);

impl BundleDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        BundleDigest(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for BundleDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a bundle's bytes come from.
#[derive(Debug, Clone)]
pub enum BundleSource {
    /// Compiled into the binary.
    Static(&'static [u8]),
    /// Held in memory, e.g. a test fixture.
    Owned(Vec<u8>),
    /// Read from disk each time the bundle is applied.
    File(PathBuf),
}

impl BundleSource {
    pub async fn load(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            BundleSource::Static(bytes) => Ok(Cow::Borrowed(*bytes)),
            BundleSource::Owned(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
            BundleSource::File(path) => tokio::fs::read(path).await.map(Cow::Owned),
        }
    }
}

/// A named entry in the catalog.
#[derive(Debug, Clone)]
pub struct Bundle {
    name: String,
    source: BundleSource,
}

impl Bundle {
    pub fn new(name: impl Into<String>, source: BundleSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// Bundle backed by in-memory text.
    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(name, BundleSource::Owned(content.into().into_bytes()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &BundleSource {
        &self.source
    }
}

/// Ordered list of bundles applied by one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct BundleCatalog {
    bundles: Vec<Bundle>,
}

impl BundleCatalog {
    pub fn new(bundles: Vec<Bundle>) -> Self {
        Self { bundles }
    }

    /// The default stack compiled into the binary.
    pub fn embedded() -> Self {
        let bundles = EMBEDDED_BUNDLES
            .iter()
            .map(|(name, bytes)| Bundle::new(*name, BundleSource::Static(*bytes)))
            .collect();
        Self { bundles }
    }

    /// The default stack order, read from `dir` at apply time.
    ///
    /// Missing files surface as load failures during the pass, not here.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let bundles = DEFAULT_BUNDLE_ORDER
            .iter()
            .map(|name| Bundle::new(*name, BundleSource::File(dir.join(name))))
            .collect();
        Self { bundles }
    }

    /// Append a bundle after all existing ones.
    pub fn push(&mut self, bundle: Bundle) {
        self.bundles.push(bundle);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bundle> {
        self.bundles.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.bundles.iter().map(Bundle::name).collect()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

impl<'a> IntoIterator for &'a BundleCatalog {
    type Item = &'a Bundle;
    type IntoIter = std::slice::Iter<'a, Bundle>;

    fn into_iter(self) -> Self::IntoIter {
        self.bundles.iter()
    }
}
