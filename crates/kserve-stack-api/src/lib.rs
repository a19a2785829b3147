//! KServeStack API
//!
//! The `KServeStack` custom resource declares "install the KServe serving
//! stack into this cluster". It carries no behavior of its own: the installer
//! watches it and converges the cluster whenever an instance is created or
//! changed.
//!
//! ## Key Components
//!
//! - [`KServeStack`]: the custom resource (`kserve.kserve.example.com/v1alpha1`)
//! - [`DescriptorRef`]: namespace-qualified reference used to trigger a pass
//! - [`crd_yaml`]: the CustomResourceDefinition rendered for installation

use std::fmt;

use kube::{CustomResource, CustomResourceExt, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the descriptor.
pub const GROUP: &str = "kserve.kserve.example.com";

/// API version of the descriptor.
pub const VERSION: &str = "v1alpha1";

/// Kind of the descriptor.
pub const KIND: &str = "KServeStack";

/// Desired state of a KServe stack installation.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "kserve.kserve.example.com",
    version = "v1alpha1",
    kind = "KServeStack",
    plural = "kservestacks",
    namespaced
)]
#[kube(status = "KServeStackStatus")]
#[serde(rename_all = "camelCase")]
pub struct KServeStackSpec {
    /// Free-form parameter reserved for stack customisation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foo: Option<String>,
}

/// Observed state of a KServe stack installation.
///
/// Intentionally empty: the installer does not yet report convergence back
/// onto the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KServeStackStatus {}

/// Errors produced when deriving a [`DescriptorRef`] from an object.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorRefError {
    #[error("descriptor has no metadata.name")]
    MissingName,

    #[error("descriptor {name} has no metadata.namespace")]
    MissingNamespace { name: String },
}

/// Namespace-qualified reference to a [`KServeStack`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DescriptorRef {
    pub namespace: String,
    pub name: String,
}

impl DescriptorRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build a reference from an object's metadata.
    pub fn from_resource<K: Resource>(obj: &K) -> Result<Self, DescriptorRefError> {
        let meta = obj.meta();
        let name = meta.name.clone().ok_or(DescriptorRefError::MissingName)?;
        let namespace = meta
            .namespace
            .clone()
            .ok_or_else(|| DescriptorRefError::MissingNamespace { name: name.clone() })?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for DescriptorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Render the `KServeStack` CustomResourceDefinition as YAML.
pub fn crd_yaml() -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&KServeStack::crd())
}
