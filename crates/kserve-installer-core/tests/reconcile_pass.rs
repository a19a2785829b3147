//! End-to-end reconciliation passes against the in-memory cluster.
//!
//! Covers ordering, fail-fast, idempotence, stale triggers, blank bundles,
//! deadlines and status reporting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kserve_installer_core::fakes::MemoryCluster;
use kserve_installer_core::{
    Bundle, BundleCatalog, BundleError, ClusterError, DecodeError, DescriptorRef, EngineConfig,
    KServeStack, KServeStackSpec, ObjectKey, PassReport, ReconcileError, ReconcileOutcome,
    Reconciler, StatusError, StatusReporter, DEFAULT_BUNDLE_ORDER,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const NAMESPACE_DOC: &str = "apiVersion: v1
kind: Namespace
metadata:
  name: kserve
";

fn role_binding(name: &str) -> String {
    format!(
        "apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: {name}
  namespace: kserve
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: view
subjects:
  - kind: ServiceAccount
    name: {name}
    namespace: kserve
"
    )
}

fn config_map(name: &str) -> String {
    format!(
        "apiVersion: v1
kind: ConfigMap
metadata:
  name: {name}
  namespace: kserve
data:
  mode: serverless
"
    )
}

fn ns_key() -> ObjectKey {
    ObjectKey::new("v1", "Namespace", None, "kserve")
}

fn rb_key(name: &str) -> ObjectKey {
    ObjectKey::new("rbac.authorization.k8s.io/v1", "RoleBinding", Some("kserve"), name)
}

fn cm_key(name: &str) -> ObjectKey {
    ObjectKey::new("v1", "ConfigMap", Some("kserve"), name)
}

fn default_ref() -> DescriptorRef {
    DescriptorRef::new("kserve", "default")
}

/// Cluster holding the `default` descriptor with an empty spec.
fn cluster_with_descriptor() -> Arc<MemoryCluster> {
    let cluster = Arc::new(MemoryCluster::new());
    cluster.insert_descriptor(
        &default_ref(),
        KServeStack::new("default", KServeStackSpec::default()),
    );
    cluster
}

fn reconciler(cluster: &Arc<MemoryCluster>, bundles: Vec<Bundle>) -> Reconciler {
    Reconciler::new(
        cluster.clone(),
        BundleCatalog::new(bundles),
        EngineConfig::default(),
    )
}

fn ns_and_rbac() -> Vec<Bundle> {
    vec![
        Bundle::inline("ns.yaml", NAMESPACE_DOC),
        Bundle::inline(
            "rbac.yaml",
            format!("{}---\n{}", role_binding("first"), role_binding("second")),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn namespace_then_role_bindings_in_document_order() {
    let cluster = cluster_with_descriptor();
    let outcome = reconciler(&cluster, ns_and_rbac())
        .reconcile(&default_ref())
        .await
        .expect("reconcile");

    assert_eq!(
        cluster.applied_log(),
        vec![ns_key(), rb_key("first"), rb_key("second")]
    );

    let ReconcileOutcome::Converged(report) = outcome else {
        panic!("expected convergence");
    };
    assert_eq!(report.bundles.len(), 2);
    assert_eq!(report.bundles[0].name, "ns.yaml");
    assert_eq!(report.bundles[1].objects, vec![rb_key("first"), rb_key("second")]);
    assert_eq!(report.objects_applied(), 3);
}

#[tokio::test]
async fn malformed_document_aborts_after_preceding_object() {
    let cluster = cluster_with_descriptor();
    let bundles = vec![
        Bundle::inline("ns.yaml", NAMESPACE_DOC),
        Bundle::inline(
            "rbac.yaml",
            format!("{}---\nmetadata: {{name: [broken\n", role_binding("first")),
        ),
        Bundle::inline("later.yaml", config_map("never")),
    ];

    let err = reconciler(&cluster, bundles)
        .reconcile(&default_ref())
        .await
        .unwrap_err();

    assert_eq!(err.bundle(), Some("rbac.yaml"));
    match &err {
        ReconcileError::Bundle {
            source: BundleError::Decode { index, source },
            ..
        } => {
            assert_eq!(*index, 1);
            assert!(matches!(source, DecodeError::Yaml(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("rbac.yaml"));
    assert_eq!(cluster.applied_log(), vec![ns_key(), rb_key("first")]);
    assert!(cluster.object(&cm_key("never")).is_none());
}

// ---------------------------------------------------------------------------
// Ordering and fail-fast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn objects_are_applied_in_catalog_then_document_order() {
    let cluster = cluster_with_descriptor();
    let bundles = vec![
        Bundle::inline("a.yaml", format!("{}---\n{}", config_map("a1"), config_map("a2"))),
        Bundle::inline("b.yaml", config_map("b1")),
        Bundle::inline("c.yaml", format!("{}\n---\n{}", config_map("c1"), config_map("c2"))),
    ];

    reconciler(&cluster, bundles)
        .reconcile(&default_ref())
        .await
        .expect("reconcile");

    let order: Vec<String> = cluster
        .applied_log()
        .into_iter()
        .map(|key| key.name)
        .collect();
    assert_eq!(order, vec!["a1", "a2", "b1", "c1", "c2"]);
}

#[tokio::test]
async fn rejected_object_stops_the_pass() {
    let cluster = cluster_with_descriptor();
    cluster.reject_object("RoleBinding", "second");
    let mut bundles = ns_and_rbac();
    bundles.push(Bundle::inline("cm.yaml", config_map("after")));

    let err = reconciler(&cluster, bundles)
        .reconcile(&default_ref())
        .await
        .unwrap_err();

    match &err {
        ReconcileError::Bundle {
            bundle,
            source: BundleError::Apply { kind, name, source },
        } => {
            assert_eq!(bundle, "rbac.yaml");
            assert_eq!(kind, "RoleBinding");
            assert_eq!(name, "second");
            assert!(matches!(source, ClusterError::Rejected { code: 422, .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("RoleBinding/second"));
    assert_eq!(cluster.applied_log(), vec![ns_key(), rb_key("first")]);
}

#[tokio::test]
async fn retry_after_failure_completes_from_the_top() {
    let cluster = cluster_with_descriptor();
    cluster.reject_object("ConfigMap", "flaky");
    let engine = reconciler(
        &cluster,
        vec![
            Bundle::inline("ns.yaml", NAMESPACE_DOC),
            Bundle::inline("cm.yaml", config_map("flaky")),
        ],
    );

    engine.reconcile(&default_ref()).await.unwrap_err();
    let ns_after_failure = cluster.object(&ns_key()).expect("namespace applied");
    assert!(cluster.object(&cm_key("flaky")).is_none());

    cluster.allow_object("ConfigMap", "flaky");
    let outcome = engine.reconcile(&default_ref()).await.expect("retry");

    assert!(matches!(outcome, ReconcileOutcome::Converged(_)));
    assert_eq!(cluster.object(&ns_key()), Some(ns_after_failure));
    assert!(cluster.object(&cm_key("flaky")).is_some());
    assert_eq!(
        cluster.applied_log(),
        vec![ns_key(), ns_key(), cm_key("flaky")]
    );
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_pass_leaves_cluster_unchanged() {
    let cluster = cluster_with_descriptor();
    let mut bundles = ns_and_rbac();
    bundles.push(Bundle::inline("cm.yaml", config_map("settings")));
    let engine = reconciler(&cluster, bundles);

    engine.reconcile(&default_ref()).await.expect("first pass");
    let after_first = cluster.snapshot();
    engine.reconcile(&default_ref()).await.expect("second pass");
    let after_second = cluster.snapshot();

    assert_eq!(after_first, after_second);
    assert_eq!(cluster.applied_log().len(), 8);
}

#[tokio::test]
async fn embedded_stack_converges_twice_without_changes() {
    let cluster = cluster_with_descriptor();
    let engine = Reconciler::new(
        cluster.clone(),
        BundleCatalog::embedded(),
        EngineConfig::default(),
    );

    let outcome = engine.reconcile(&default_ref()).await.expect("first pass");
    let ReconcileOutcome::Converged(report) = outcome else {
        panic!("expected convergence");
    };
    let names: Vec<&str> = report.bundles.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, DEFAULT_BUNDLE_ORDER.to_vec());

    let log = cluster.applied_log();
    let first_non_namespace = log
        .iter()
        .position(|key| key.kind != "Namespace")
        .expect("non-namespace object");
    assert!(log[..first_non_namespace].len() >= 3);
    assert!(log[first_non_namespace..].iter().all(|key| key.kind != "Namespace"));

    let snapshot = cluster.snapshot();
    engine.reconcile(&default_ref()).await.expect("second pass");
    assert_eq!(snapshot, cluster.snapshot());
}

// ---------------------------------------------------------------------------
// Stale triggers, fetch failures and blank bundles
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_descriptor_is_a_stale_trigger() {
    let cluster = Arc::new(MemoryCluster::new());
    let outcome = reconciler(&cluster, ns_and_rbac())
        .reconcile(&default_ref())
        .await
        .expect("stale trigger is not an error");

    assert_eq!(outcome, ReconcileOutcome::StaleTrigger);
    assert!(cluster.applied_log().is_empty());
}

#[tokio::test]
async fn deleted_descriptor_becomes_stale() {
    let cluster = cluster_with_descriptor();
    let engine = reconciler(&cluster, ns_and_rbac());
    engine.reconcile(&default_ref()).await.expect("first pass");

    cluster.remove_descriptor(&default_ref());
    let outcome = engine.reconcile(&default_ref()).await.expect("second pass");
    assert_eq!(outcome, ReconcileOutcome::StaleTrigger);
    assert_eq!(cluster.applied_log().len(), 3);
}

#[tokio::test]
async fn fetch_failure_is_transient_error() {
    let cluster = cluster_with_descriptor();
    cluster.fail_fetch_with("etcd leader changed");

    let err = reconciler(&cluster, ns_and_rbac())
        .reconcile(&default_ref())
        .await
        .unwrap_err();
    match err {
        ReconcileError::Fetch { descriptor, source } => {
            assert_eq!(descriptor, default_ref());
            assert!(matches!(source, ClusterError::Transport(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(cluster.applied_log().is_empty());
}

#[tokio::test]
async fn separator_only_bundle_applies_nothing() {
    let cluster = cluster_with_descriptor();
    let bundles = vec![
        Bundle::inline("blank.yaml", "---\n\n---\n   \n\n---\n"),
        Bundle::inline("ns.yaml", NAMESPACE_DOC),
    ];

    let outcome = reconciler(&cluster, bundles)
        .reconcile(&default_ref())
        .await
        .expect("reconcile");
    let ReconcileOutcome::Converged(report) = outcome else {
        panic!("expected convergence");
    };
    assert!(report.bundles[0].objects.is_empty());
    assert_eq!(cluster.applied_log(), vec![ns_key()]);
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pass_exceeding_deadline_fails_transiently() {
    let cluster = cluster_with_descriptor();
    cluster.set_apply_delay(Duration::from_secs(10));
    let engine = Reconciler::new(
        cluster.clone(),
        BundleCatalog::new(ns_and_rbac()),
        EngineConfig {
            pass_timeout: Some(Duration::from_secs(15)),
            ..EngineConfig::default()
        },
    );

    let err = engine.reconcile(&default_ref()).await.unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::DeadlineExceeded { after } if after == Duration::from_secs(15)
    ));
    assert_eq!(cluster.applied_log(), vec![ns_key()]);
}

// ---------------------------------------------------------------------------
// Status reporting
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn pass_succeeded(
        &self,
        descriptor: &DescriptorRef,
        report: &PassReport,
    ) -> Result<(), StatusError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("ok {descriptor} {}", report.objects_applied()));
        Err(StatusError("status subresource unavailable".to_string()))
    }

    async fn pass_failed(
        &self,
        descriptor: &DescriptorRef,
        error: &ReconcileError,
    ) -> Result<(), StatusError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("failed {descriptor} {}", error.bundle().unwrap_or("-")));
        Ok(())
    }
}

#[tokio::test]
async fn status_reporter_sees_outcomes_but_cannot_change_them() {
    let cluster = cluster_with_descriptor();
    let reporter = Arc::new(RecordingReporter::default());
    let engine = reconciler(&cluster, ns_and_rbac()).with_status_reporter(reporter.clone());

    let outcome = engine.reconcile(&default_ref()).await;
    assert!(matches!(outcome, Ok(ReconcileOutcome::Converged(_))));

    cluster.reject_object("Namespace", "kserve");
    engine.reconcile(&default_ref()).await.unwrap_err();

    cluster.remove_descriptor(&default_ref());
    engine.reconcile(&default_ref()).await.expect("stale");

    assert_eq!(
        *reporter.events.lock().unwrap(),
        vec![
            "ok kserve/default 3".to_string(),
            "failed kserve/default ns.yaml".to_string(),
        ]
    );
}
