//! Reconciling a generated manifest against the live cluster
//!
//! [`ManifestDiffer`] parses a manifest, then checks each object in document
//! order by running its kind's lookup under a per-object [`RetryPolicy`].
//! Objects are never checked concurrently.
//!
//! Kinds with no registered lookup pass without a check. This keeps the
//! verifier usable on manifests containing kinds it does not know, at the
//! cost of not verifying them; they are listed in [`ReconcileReport::skipped`].

mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::manifest::{parse_k8s_objects, K8sObject, ObjectRef};
use crate::probe::ClusterResourceProbe;
use crate::retry::{poll, RetryPolicy};
use crate::Error;

pub use registry::{KindRegistry, LookupFuture};

/// What to do when an object's lookup times out
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "camelCase")]
pub enum FailureMode {
    /// Stop at the first missing object; later objects are not checked
    #[default]
    FailFast,
    /// Check every object and report all missing ones together
    CollectAll,
}

/// An expected object that was not found within its retry window
#[derive(Debug)]
pub struct Mismatch {
    /// The object
    pub object: ObjectRef,
    /// Why it was considered missing (normally [`Error::Timeout`])
    pub cause: Box<Error>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.object, self.cause)
    }
}

/// Missing objects from one reconciliation, in manifest order
#[derive(Debug, Default)]
pub struct MismatchList(Vec<Mismatch>);

impl MismatchList {
    /// Number of missing objects
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is missing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the missing objects
    pub fn iter(&self) -> impl Iterator<Item = &Mismatch> {
        self.0.iter()
    }
}

impl fmt::Display for MismatchList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mismatch) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", mismatch)?;
        }
        Ok(())
    }
}

/// Outcome of a successful reconciliation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Objects whose lookup succeeded
    pub verified: Vec<ObjectRef>,
    /// Objects of unregistered kinds, not checked
    pub skipped: Vec<ObjectRef>,
}

/// Compares a desired manifest with what the cluster actually has
#[derive(Clone, Debug)]
pub struct ManifestDiffer {
    registry: KindRegistry,
    policy: RetryPolicy,
    mode: FailureMode,
}

impl ManifestDiffer {
    /// Differ with the default kinds, fail-fast, and the given per-object
    /// policy; rejects policies that could not make progress
    pub fn new(policy: RetryPolicy) -> Result<Self, Error> {
        policy.validate()?;
        Ok(Self {
            registry: KindRegistry::with_default_kinds(),
            policy,
            mode: FailureMode::FailFast,
        })
    }

    /// Replace the kind registry
    pub fn with_registry(mut self, registry: KindRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the failure mode
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    /// The kind registry in use
    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Parse `manifest` and verify every object exists in the cluster.
    ///
    /// A parse failure is returned immediately without any lookup.
    pub async fn reconcile(
        &self,
        manifest: &str,
        probe: &dyn ClusterResourceProbe,
    ) -> Result<ReconcileReport, Error> {
        let objects = parse_k8s_objects(manifest)?;
        self.reconcile_objects(&objects, probe).await
    }

    /// Verify already-parsed objects, in order
    pub async fn reconcile_objects(
        &self,
        objects: &[K8sObject],
        probe: &dyn ClusterResourceProbe,
    ) -> Result<ReconcileReport, Error> {
        let mut report = ReconcileReport::default();
        let mut mismatches = Vec::new();

        for object in objects {
            if !self.registry.is_registered(&object.kind) {
                debug!(kind = %object.kind, name = %object.name, "No lookup registered for kind, skipping");
                report.skipped.push(object.object_ref());
                continue;
            }

            info!(
                kind = %object.kind,
                namespace = %object.namespace,
                name = %object.name,
                "Checking object"
            );

            match self.verify_object(object, probe).await {
                Ok(()) => report.verified.push(object.object_ref()),
                Err(cause) => {
                    warn!(object = %object, error = %cause, "Expected object missing from cluster");
                    mismatches.push(Mismatch {
                        object: object.object_ref(),
                        cause: Box::new(cause),
                    });
                    if self.mode == FailureMode::FailFast {
                        break;
                    }
                }
            }
        }

        if !mismatches.is_empty() {
            return Err(Error::Mismatch(MismatchList(mismatches)));
        }

        info!(
            verified = report.verified.len(),
            skipped = report.skipped.len(),
            "Manifest reconciled"
        );
        Ok(report)
    }

    async fn verify_object(
        &self,
        object: &K8sObject,
        probe: &dyn ClusterResourceProbe,
    ) -> Result<(), Error> {
        let operation = format!("lookup {}", object);
        poll(&self.policy, &operation, || {
            let lookup = self.registry.lookup(probe, object);
            async move {
                match lookup {
                    Some(lookup) => lookup.await.map_err(|e| as_not_present(object, e)),
                    None => Ok(()),
                }
            }
        })
        .await
    }
}

/// Any lookup failure means "not there yet" and must stay retryable
fn as_not_present(object: &K8sObject, err: Error) -> Error {
    if err.is_retryable() {
        err
    } else {
        Error::not_ready(format!("lookup of {} failed: {}", object, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MockClusterResourceProbe;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{Service, ServiceAccount};
    use std::time::Duration;
    use tokio::time::Instant;

    const ISTIOD: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: istiod
  namespace: istio-system
"#;

    const ISTIOD_THEN_SERVICE: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: istiod
  namespace: istio-system
---
apiVersion: v1
kind: Service
metadata:
  name: istiod
  namespace: istio-system
"#;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(30), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn unregistered_kind_passes_without_lookups() {
        // A mock with no expectations panics on any call
        let probe = MockClusterResourceProbe::new();
        let manifest = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: cacerts\n  namespace: istio-system\n";

        let report = ManifestDiffer::new(policy())
            .unwrap()
            .reconcile(manifest, &probe)
            .await
            .unwrap();

        assert!(report.verified.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].to_string(), "Secret/istio-system/cacerts");
    }

    #[tokio::test]
    async fn present_object_is_verified() {
        let mut probe = MockClusterResourceProbe::new();
        probe
            .expect_get_deployment()
            .times(1)
            .returning(|_, _| Ok(Deployment::default()));

        let report = ManifestDiffer::new(policy())
            .unwrap()
            .reconcile(ISTIOD, &probe)
            .await
            .unwrap();
        assert_eq!(report.verified.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn object_appearing_late_is_retried() {
        let mut probe = MockClusterResourceProbe::new();
        let mut seq = mockall::Sequence::new();
        probe
            .expect_get_deployment()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|ns, name| Err(Error::not_found("Deployment", ns, name)));
        probe
            .expect_get_deployment()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Deployment::default()));

        let differ = ManifestDiffer::new(policy()).unwrap();
        assert!(differ.reconcile(ISTIOD, &probe).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_object_fails_fast() {
        let mut probe = MockClusterResourceProbe::new();
        probe
            .expect_get_deployment()
            .returning(|ns, name| Err(Error::not_found("Deployment", ns, name)));
        probe.expect_get_service().times(0);

        let start = Instant::now();
        let err = ManifestDiffer::new(policy())
            .unwrap()
            .reconcile(ISTIOD_THEN_SERVICE, &probe)
            .await
            .unwrap_err();

        assert!(start.elapsed() >= Duration::from_secs(30));
        match err {
            Error::Mismatch(list) => {
                assert_eq!(list.len(), 1);
                let mismatch = list.iter().next().unwrap();
                assert_eq!(mismatch.object.to_string(), "Deployment/istio-system/istiod");
                assert!(matches!(*mismatch.cause, Error::Timeout { .. }));
            }
            other => panic!("expected Mismatch, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn collect_all_checks_every_object() {
        let mut probe = MockClusterResourceProbe::new();
        probe
            .expect_get_deployment()
            .returning(|ns, name| Err(Error::not_found("Deployment", ns, name)));
        probe
            .expect_get_service()
            .times(1)
            .returning(|_, _| Ok(Service::default()));
        probe
            .expect_get_service_account()
            .returning(|ns, name| Err(Error::not_found("ServiceAccount", ns, name)));

        let manifest = format!(
            "{}---\nkind: ServiceAccount\nmetadata:\n  name: istiod\n  namespace: istio-system\n",
            ISTIOD_THEN_SERVICE
        );
        let err = ManifestDiffer::new(policy())
            .unwrap()
            .with_failure_mode(FailureMode::CollectAll)
            .reconcile(&manifest, &probe)
            .await
            .unwrap_err();

        match err {
            Error::Mismatch(list) => {
                let objects: Vec<String> = list.iter().map(|m| m.object.to_string()).collect();
                assert_eq!(
                    objects,
                    vec![
                        "Deployment/istio-system/istiod",
                        "ServiceAccount/istio-system/istiod"
                    ]
                );
            }
            other => panic!("expected Mismatch, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_lookup_errors_are_still_retried() {
        let mut probe = MockClusterResourceProbe::new();
        let mut seq = mockall::Sequence::new();
        probe
            .expect_get_service_account()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(Error::internal_with_context("probe", "connection reset")));
        probe
            .expect_get_service_account()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ServiceAccount::default()));

        let manifest = "kind: ServiceAccount\nmetadata:\n  name: istiod\n  namespace: istio-system\n";
        let differ = ManifestDiffer::new(policy()).unwrap();
        assert!(differ.reconcile(manifest, &probe).await.is_ok());
    }

    #[tokio::test]
    async fn parse_failure_is_fatal() {
        let probe = MockClusterResourceProbe::new();
        let err = ManifestDiffer::new(policy())
            .unwrap()
            .reconcile("kind: Service\nmetadata: {}\n", &probe)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[tokio::test]
    async fn empty_registry_skips_everything() {
        let probe = MockClusterResourceProbe::new();
        let report = ManifestDiffer::new(policy())
            .unwrap()
            .with_registry(KindRegistry::empty())
            .reconcile(ISTIOD_THEN_SERVICE, &probe)
            .await
            .unwrap();
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn zero_delay_policy_is_rejected() {
        let policy = RetryPolicy::new(Duration::from_secs(30), Duration::ZERO);
        assert!(matches!(ManifestDiffer::new(policy), Err(Error::Config { .. })));
    }

    #[test]
    fn failure_mode_parses_from_config() {
        let mode: FailureMode = serde_json::from_str("\"collectAll\"").unwrap();
        assert_eq!(mode, FailureMode::CollectAll);
    }
}
