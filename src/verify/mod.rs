//! End-to-end installation verification
//!
//! A run is three checks in sequence, each under its own retry policy:
//!
//! 1. the installer reports itself and all components HEALTHY
//! 2. every pod in the control-plane namespace is ready (optional)
//! 3. every object in the generated manifest exists in the cluster
//!
//! The first failing check ends the run.

use tracing::info;

use crate::config::VerifyConfig;
use crate::probe::{check_pods_ready, ClusterResourceProbe};
use crate::reconcile::{ManifestDiffer, ReconcileReport};
use crate::status::{check_install_status, InstallStatusReport};
use crate::Error;

/// Results of a successful verification run
#[derive(Clone, Debug)]
pub struct VerificationReport {
    /// The healthy status report
    pub status: InstallStatusReport,
    /// Ready pods in the control-plane namespace, if checked
    pub ready_pods: Option<usize>,
    /// Manifest reconciliation outcome
    pub reconcile: ReconcileReport,
}

/// Runs the full verification against one cluster
#[derive(Clone, Debug)]
pub struct Verifier {
    config: VerifyConfig,
    differ: ManifestDiffer,
}

impl Verifier {
    /// Build a verifier; the config is validated up front
    pub fn new(config: VerifyConfig) -> Result<Self, Error> {
        config.validate()?;
        let differ = ManifestDiffer::new(config.object_policy)?
            .with_failure_mode(config.failure_mode);
        Ok(Self { config, differ })
    }

    /// Replace the manifest differ, e.g. to register extra kinds
    pub fn with_differ(mut self, differ: ManifestDiffer) -> Self {
        self.differ = differ;
        self
    }

    /// The active configuration
    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// The manifest differ
    pub fn differ(&self) -> &ManifestDiffer {
        &self.differ
    }

    /// Verify the install status, pod readiness and the manifest
    pub async fn run(
        &self,
        probe: &dyn ClusterResourceProbe,
        manifest: &str,
    ) -> Result<VerificationReport, Error> {
        info!("Verifying installation");

        let status = check_install_status(probe, &self.config).await?;

        let ready_pods = if self.config.check_pods {
            Some(
                check_pods_ready(
                    probe,
                    &self.config.control_plane_namespace,
                    &self.config.pods_policy,
                )
                .await?,
            )
        } else {
            None
        };

        let reconcile = self.differ.reconcile(manifest, probe).await?;

        info!(
            verified = reconcile.verified.len(),
            skipped = reconcile.skipped.len(),
            "Installation verified"
        );
        Ok(VerificationReport {
            status,
            ready_pods,
            reconcile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MockClusterResourceProbe;
    use crate::retry::RetryPolicy;
    use k8s_openapi::api::apps::v1::Deployment;
    use kube::api::DynamicObject;
    use serde_json::json;
    use std::time::Duration;

    const MANIFEST: &str =
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: istiod\n  namespace: istio-system\n";

    fn config() -> VerifyConfig {
        VerifyConfig {
            status_policy: RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(1)),
            check_pods: false,
            ..Default::default()
        }
    }

    fn status_object(status: serde_json::Value) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: Default::default(),
            data: json!({ "status": status }),
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = VerifyConfig {
            install_name: String::new(),
            ..Default::default()
        };
        assert!(matches!(Verifier::new(config), Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn healthy_install_is_verified() {
        let mut probe = MockClusterResourceProbe::new();
        probe.expect_get_custom_resource().returning(|_, _, _| {
            Ok(status_object(json!({
                "status": "HEALTHY",
                "componentStatus": {"pilot": {"status": "HEALTHY"}}
            })))
        });
        probe
            .expect_get_deployment()
            .times(1)
            .returning(|_, _| Ok(Deployment::default()));

        let report = Verifier::new(config())
            .unwrap()
            .run(&probe, MANIFEST)
            .await
            .unwrap();
        assert_eq!(report.reconcile.verified.len(), 1);
        assert!(report.ready_pods.is_none());
    }

    #[tokio::test]
    async fn decode_failure_stops_before_reconcile() {
        let mut probe = MockClusterResourceProbe::new();
        probe
            .expect_get_custom_resource()
            .times(1)
            .returning(|_, _, _| Ok(status_object(json!("HEALTHY"))));
        probe.expect_get_deployment().times(0);

        let err = Verifier::new(config())
            .unwrap()
            .run(&probe, MANIFEST)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
