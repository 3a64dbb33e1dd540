//! Read-only lookups against the cluster
//!
//! [`ClusterResourceProbe`] is the only way the verifier observes the
//! cluster. Production code uses [`KubeResourceProbe`]; tests substitute a
//! mock or an in-memory fake. Every lookup either returns the resource or
//! fails; callers treat any failure as "not there yet" and retry it.

mod cluster;
mod readiness;

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service, ServiceAccount};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
#[cfg(test)]
use mockall::automock;

use crate::Error;

pub use cluster::KubeResourceProbe;
pub use readiness::{check_pods_ready, pod_ready, pods_ready};

/// Group/version/resource triple addressing a custom resource type
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Gvr {
    /// API group, empty for the core group
    pub group: String,
    /// API version
    pub version: String,
    /// Plural resource name
    pub resource: String,
}

impl Gvr {
    /// Create a GVR
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// The installer's own custom resource
    pub fn istio_operator() -> Self {
        Self::new("install.istio.io", "v1alpha1", "istiooperators")
    }

    /// Mesh Envoy filters
    pub fn envoy_filter() -> Self {
        Self::new("networking.istio.io", "v1alpha3", "envoyfilters")
    }

    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for Gvr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// Lookup operations the verifier needs, one per supported resource kind.
///
/// Cluster-scoped lookups take only a name. Implementations must not mutate
/// cluster state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterResourceProbe: Send + Sync {
    /// Fetch a Service
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, Error>;

    /// Fetch a ServiceAccount
    async fn get_service_account(&self, namespace: &str, name: &str)
        -> Result<ServiceAccount, Error>;

    /// Fetch a Deployment
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error>;

    /// Fetch a ConfigMap
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, Error>;

    /// Fetch a ValidatingWebhookConfiguration
    async fn get_validating_webhook(
        &self,
        name: &str,
    ) -> Result<ValidatingWebhookConfiguration, Error>;

    /// Fetch a MutatingWebhookConfiguration
    async fn get_mutating_webhook(&self, name: &str)
        -> Result<MutatingWebhookConfiguration, Error>;

    /// Fetch a CustomResourceDefinition
    async fn get_crd(&self, name: &str) -> Result<CustomResourceDefinition, Error>;

    /// Fetch an arbitrary resource by GVR; an empty namespace means
    /// cluster-scoped
    async fn get_custom_resource(
        &self,
        gvr: &Gvr,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, Error>;

    /// Fetch a PodDisruptionBudget
    async fn get_pod_disruption_budget(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PodDisruptionBudget, Error>;

    /// Fetch a HorizontalPodAutoscaler
    async fn get_horizontal_pod_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler, Error>;

    /// List all pods in a namespace
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, Error>;

    /// Logs of every pod in `namespace` matching `label_selector`, each
    /// section headed by its pod name
    async fn pod_logs(&self, namespace: &str, label_selector: &str) -> Result<String, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gvr_formats_api_version() {
        assert_eq!(Gvr::istio_operator().api_version(), "install.istio.io/v1alpha1");
        assert_eq!(Gvr::new("", "v1", "pods").api_version(), "v1");
        assert_eq!(
            Gvr::envoy_filter().to_string(),
            "networking.istio.io/v1alpha3/envoyfilters"
        );
    }
}
