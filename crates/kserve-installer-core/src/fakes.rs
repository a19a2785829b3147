//! In-memory fake of the cluster (testing only)
//!
//! [`MemoryCluster`] satisfies the [`ClusterClient`] contract without an API
//! server. It approximates server-side apply closely enough to observe the
//! engine's guarantees:
//! - applies deep-merge into the stored object
//! - `resource_version` only moves when the merged content changes
//! - unforced applies conflict with fields owned by another manager
//! - every successful apply is appended to an ordered log

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use kserve_stack_api::{DescriptorRef, KServeStack, KIND};

use crate::cluster::{ApplyOptions, ClusterClient, ClusterError, ClusterResult};
use crate::manifest::{ManifestObject, ObjectKey};

/// An object as held by [`MemoryCluster`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Value,
    pub resource_version: u64,
    pub managers: BTreeSet<String>,
}

/// In-memory cluster backed by ordered maps.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    descriptors: Mutex<HashMap<DescriptorRef, KServeStack>>,
    objects: Mutex<BTreeMap<ObjectKey, StoredObject>>,
    applied: Mutex<Vec<ObjectKey>>,
    rejected: Mutex<HashSet<(String, String)>>,
    fetch_failure: Mutex<Option<String>>,
    apply_delay: Mutex<Option<Duration>>,
    next_version: Mutex<u64>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a descriptor so `fetch_descriptor` finds it.
    pub fn insert_descriptor(&self, descriptor: &DescriptorRef, stack: KServeStack) {
        let mut stack = stack;
        stack.metadata.name = Some(descriptor.name.clone());
        stack.metadata.namespace = Some(descriptor.namespace.clone());
        self.descriptors
            .lock()
            .unwrap()
            .insert(descriptor.clone(), stack);
    }

    pub fn remove_descriptor(&self, descriptor: &DescriptorRef) {
        self.descriptors.lock().unwrap().remove(descriptor);
    }

    /// Make every descriptor fetch fail with a transport error.
    pub fn fail_fetch_with(&self, message: impl Into<String>) {
        *self.fetch_failure.lock().unwrap() = Some(message.into());
    }

    /// Reject applies of the object with this kind and name.
    pub fn reject_object(&self, kind: impl Into<String>, name: impl Into<String>) {
        self.rejected
            .lock()
            .unwrap()
            .insert((kind.into(), name.into()));
    }

    /// Lift a rejection added by [`MemoryCluster::reject_object`].
    pub fn allow_object(&self, kind: &str, name: &str) {
        self.rejected
            .lock()
            .unwrap()
            .remove(&(kind.to_string(), name.to_string()));
    }

    /// Sleep before each apply, to exercise deadlines.
    pub fn set_apply_delay(&self, delay: Duration) {
        *self.apply_delay.lock().unwrap() = Some(delay);
    }

    /// Keys of successful applies, in call order.
    pub fn applied_log(&self) -> Vec<ObjectKey> {
        self.applied.lock().unwrap().clone()
    }

    pub fn object(&self, key: &ObjectKey) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Snapshot of the whole object store.
    pub fn snapshot(&self) -> BTreeMap<ObjectKey, StoredObject> {
        self.objects.lock().unwrap().clone()
    }

    /// Seed an object as if another manager had applied it.
    pub fn seed_object(&self, object: &ManifestObject, manager: impl Into<String>) {
        let version = self.bump_version();
        self.objects.lock().unwrap().insert(
            object.key(),
            StoredObject {
                body: object.body.clone(),
                resource_version: version,
                managers: BTreeSet::from([manager.into()]),
            },
        );
    }

    fn bump_version(&self) -> u64 {
        let mut next = self.next_version.lock().unwrap();
        *next += 1;
        *next
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn fetch_descriptor(&self, descriptor: &DescriptorRef) -> ClusterResult<KServeStack> {
        if let Some(message) = self.fetch_failure.lock().unwrap().clone() {
            return Err(ClusterError::Transport(message));
        }
        self.descriptors
            .lock()
            .unwrap()
            .get(descriptor)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: KIND.to_string(),
                name: descriptor.to_string(),
            })
    }

    async fn apply(&self, object: &ManifestObject, options: &ApplyOptions) -> ClusterResult<()> {
        let delay = *self.apply_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let rejected = self
            .rejected
            .lock()
            .unwrap()
            .contains(&(object.kind.clone(), object.name.clone()));
        if rejected {
            return Err(ClusterError::Rejected {
                code: 422,
                reason: "Invalid".to_string(),
                message: format!("{} {} rejected", object.kind, object.name),
            });
        }

        let key = object.key();
        let existing = self.objects.lock().unwrap().get(&key).cloned();
        let stored = match existing {
            None => StoredObject {
                body: object.body.clone(),
                resource_version: self.bump_version(),
                managers: BTreeSet::from([options.field_manager.clone()]),
            },
            Some(current) => {
                let foreign_owner = current
                    .managers
                    .iter()
                    .any(|m| m != &options.field_manager);
                let mut merged = current.body.clone();
                merge_into(&mut merged, &object.body);
                let changed = merged != current.body;

                if changed && foreign_owner && !options.force {
                    return Err(ClusterError::Rejected {
                        code: 409,
                        reason: "Conflict".to_string(),
                        message: format!("Apply failed with conflicts on {key}"),
                    });
                }

                let mut managers = if options.force {
                    BTreeSet::new()
                } else {
                    current.managers.clone()
                };
                managers.insert(options.field_manager.clone());
                let resource_version = if changed {
                    self.bump_version()
                } else {
                    current.resource_version
                };
                StoredObject {
                    body: merged,
                    resource_version,
                    managers,
                }
            }
        };

        self.objects.lock().unwrap().insert(key.clone(), stored);
        self.applied.lock().unwrap().push(key);
        Ok(())
    }
}

/// Recursive merge: mappings merge key by key, everything else is replaced.
fn merge_into(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (k, v) in patch {
                merge_into(target.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::decode_document;
    use kserve_stack_api::KServeStackSpec;

    fn config_map(value: &str) -> ManifestObject {
        decode_document(&format!(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: kserve\ndata:\n  key: {value}\n"
        ))
        .expect("decode")
    }

    #[tokio::test]
    async fn test_fetch_missing_descriptor_is_not_found() {
        let cluster = MemoryCluster::new();
        let err = cluster
            .fetch_descriptor(&DescriptorRef::new("kserve", "default"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_inserted_descriptor() {
        let cluster = MemoryCluster::new();
        let descriptor = DescriptorRef::new("kserve", "default");
        cluster.insert_descriptor(
            &descriptor,
            KServeStack::new("ignored", KServeStackSpec::default()),
        );
        let stack = cluster.fetch_descriptor(&descriptor).await.expect("fetch");
        assert_eq!(stack.metadata.name.as_deref(), Some("default"));
        assert_eq!(stack.metadata.namespace.as_deref(), Some("kserve"));
    }

    #[tokio::test]
    async fn test_reapply_same_content_keeps_version() {
        let cluster = MemoryCluster::new();
        let options = ApplyOptions::default();
        let obj = config_map("a");

        cluster.apply(&obj, &options).await.expect("first");
        let first = cluster.object(&obj.key()).expect("stored");
        cluster.apply(&obj, &options).await.expect("second");
        let second = cluster.object(&obj.key()).expect("stored");

        assert_eq!(first, second);
        assert_eq!(cluster.applied_log().len(), 2);
    }

    #[tokio::test]
    async fn test_changed_content_bumps_version() {
        let cluster = MemoryCluster::new();
        let options = ApplyOptions::default();
        cluster.apply(&config_map("a"), &options).await.expect("first");
        let before = cluster.object(&config_map("a").key()).expect("stored");
        cluster.apply(&config_map("b"), &options).await.expect("second");
        let after = cluster.object(&config_map("b").key()).expect("stored");

        assert!(after.resource_version > before.resource_version);
        assert_eq!(after.body["data"]["key"], "b");
    }

    #[tokio::test]
    async fn test_forced_apply_takes_ownership() {
        let cluster = MemoryCluster::new();
        cluster.seed_object(&config_map("theirs"), "kubectl");

        let unforced = ApplyOptions {
            field_manager: "kserve-installer".to_string(),
            force: false,
        };
        let err = cluster.apply(&config_map("ours"), &unforced).await.unwrap_err();
        assert!(matches!(err, ClusterError::Rejected { code: 409, .. }));

        cluster
            .apply(&config_map("ours"), &ApplyOptions::default())
            .await
            .expect("forced");
        let stored = cluster.object(&config_map("ours").key()).expect("stored");
        assert_eq!(stored.body["data"]["key"], "ours");
        assert_eq!(
            stored.managers,
            BTreeSet::from(["kserve-installer".to_string()])
        );
    }

    #[tokio::test]
    async fn test_rejected_object_is_not_logged() {
        let cluster = MemoryCluster::new();
        cluster.reject_object("ConfigMap", "cfg");
        let err = cluster
            .apply(&config_map("a"), &ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Rejected { code: 422, .. }));
        assert!(cluster.applied_log().is_empty());
        assert!(cluster.snapshot().is_empty());
    }

    #[test]
    fn test_merge_into_merges_maps_and_replaces_scalars() {
        let mut target = serde_json::json!({"a": {"x": 1, "y": 2}, "b": [1]});
        merge_into(&mut target, &serde_json::json!({"a": {"y": 3}, "b": [2], "c": true}));
        assert_eq!(
            target,
            serde_json::json!({"a": {"x": 1, "y": 3}, "b": [2], "c": true})
        );
    }
}
