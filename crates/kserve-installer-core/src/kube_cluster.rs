//! kube-rs backed [`ClusterClient`].
//!
//! Kinds are resolved through discovery on every apply: bundles register
//! CRDs that later bundles instantiate, so a cache built at startup would go
//! stale within a single pass.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, Scope};
use kube::Client;
use tracing::debug;

use kserve_stack_api::{DescriptorRef, KServeStack, KIND};

use crate::cluster::{ApplyOptions, ClusterClient, ClusterError, ClusterResult};
use crate::manifest::ManifestObject;

/// [`ClusterClient`] talking to a Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the in-cluster environment or local kubeconfig.
    pub async fn try_default() -> ClusterResult<Self> {
        let client = Client::try_default().await.map_err(ClusterError::from)?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn api_for(&self, object: &ManifestObject) -> ClusterResult<Api<DynamicObject>> {
        let (group, version) = object.group_version();
        let gvk = GroupVersionKind::gvk(group, version, &object.kind);
        let (resource, capabilities) = discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|e| ClusterError::Discovery {
                api_version: object.api_version.clone(),
                kind: object.kind.clone(),
                message: e.to_string(),
            })?;

        let api = match api_target(&capabilities.scope, object)? {
            ApiTarget::Cluster => Api::all_with(self.client.clone(), &resource),
            ApiTarget::Namespaced(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
        };
        Ok(api)
    }
}

/// Where an apply request for an object is addressed.
#[derive(Debug, PartialEq, Eq)]
enum ApiTarget<'a> {
    Cluster,
    Namespaced(&'a str),
}

/// Pick the request target from the kind's scope.
///
/// Namespaced kinds must carry their own namespace; the client's default
/// namespace is never substituted.
fn api_target<'a>(scope: &Scope, object: &'a ManifestObject) -> ClusterResult<ApiTarget<'a>> {
    match (scope, object.namespace.as_deref()) {
        (Scope::Cluster, _) => Ok(ApiTarget::Cluster),
        (Scope::Namespaced, Some(ns)) => Ok(ApiTarget::Namespaced(ns)),
        (Scope::Namespaced, None) => Err(ClusterError::NamespaceRequired {
            kind: object.kind.clone(),
            name: object.name.clone(),
        }),
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn fetch_descriptor(&self, descriptor: &DescriptorRef) -> ClusterResult<KServeStack> {
        let api: Api<KServeStack> = Api::namespaced(self.client.clone(), &descriptor.namespace);
        api.get_opt(&descriptor.name)
            .await?
            .ok_or_else(|| ClusterError::NotFound {
                kind: KIND.to_string(),
                name: descriptor.to_string(),
            })
    }

    async fn apply(&self, object: &ManifestObject, options: &ApplyOptions) -> ClusterResult<()> {
        let api = self.api_for(object).await?;
        let mut params = PatchParams::apply(&options.field_manager);
        if options.force {
            params = params.force();
        }
        let applied = api
            .patch(&object.name, &params, &Patch::Apply(&object.body))
            .await?;
        debug!(
            kind = %object.kind,
            name = %object.name,
            resource_version = ?applied.metadata.resource_version,
            "server-side apply accepted"
        );
        Ok(())
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => ClusterError::Rejected {
                code: response.code,
                reason: response.reason,
                message: response.message,
            },
            other => ClusterError::Transport(other.to_string()),
        }
    }
}
