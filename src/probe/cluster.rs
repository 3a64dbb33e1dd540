//! kube-rs backed probe

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service, ServiceAccount};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DynamicObject, ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use tracing::trace;

use super::{ClusterResourceProbe, Gvr};
use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ClusterResourceProbe`] talking to a live API server
#[derive(Clone)]
pub struct KubeResourceProbe {
    client: Client,
}

impl KubeResourceProbe {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from an explicit kubeconfig, or infer one from the
    /// environment (`KUBECONFIG`, `~/.kube/config`, in-cluster)
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, Error> {
        let mut config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::internal_with_context(
                        "connect",
                        format!("failed to read kubeconfig {}: {}", path.display(), e),
                    )
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        Error::internal_with_context(
                            "connect",
                            format!("failed to load kubeconfig: {}", e),
                        )
                    })?
            }
            None => Config::infer().await.map_err(|e| {
                Error::internal_with_context("connect", format!("failed to infer config: {}", e))
            })?,
        };
        config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
        config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

        let client = Client::try_from(config).map_err(|e| {
            Error::internal_with_context("connect", format!("failed to create client: {}", e))
        })?;
        Ok(Self::new(client))
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn cluster_scoped<K>(&self) -> Api<K>
    where
        K: kube::Resource,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }
}

/// Fetch `name`, mapping 404 to [`Error::NotFound`]
async fn get_or_not_found<K>(api: &Api<K>, kind: &str, namespace: &str, name: &str) -> Result<K, Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(obj),
        Err(kube::Error::Api(e)) if e.code == 404 => {
            trace!(kind = %kind, namespace = %namespace, name = %name, "Resource not found");
            Err(Error::not_found(kind, namespace, name))
        }
        Err(e) => Err(e.into()),
    }
}

fn api_resource(gvr: &Gvr) -> ApiResource {
    ApiResource {
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        api_version: gvr.api_version(),
        // Only the plural is used to build request paths
        kind: String::new(),
        plural: gvr.resource.clone(),
    }
}

#[async_trait]
impl ClusterResourceProbe for KubeResourceProbe {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, Error> {
        get_or_not_found(&self.namespaced(namespace), "Service", namespace, name).await
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServiceAccount, Error> {
        get_or_not_found(&self.namespaced(namespace), "ServiceAccount", namespace, name).await
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, Error> {
        get_or_not_found(&self.namespaced(namespace), "Deployment", namespace, name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, Error> {
        get_or_not_found(&self.namespaced(namespace), "ConfigMap", namespace, name).await
    }

    async fn get_validating_webhook(
        &self,
        name: &str,
    ) -> Result<ValidatingWebhookConfiguration, Error> {
        get_or_not_found(
            &self.cluster_scoped(),
            "ValidatingWebhookConfiguration",
            "",
            name,
        )
        .await
    }

    async fn get_mutating_webhook(
        &self,
        name: &str,
    ) -> Result<MutatingWebhookConfiguration, Error> {
        get_or_not_found(&self.cluster_scoped(), "MutatingWebhookConfiguration", "", name).await
    }

    async fn get_crd(&self, name: &str) -> Result<CustomResourceDefinition, Error> {
        get_or_not_found(&self.cluster_scoped(), "CustomResourceDefinition", "", name).await
    }

    async fn get_custom_resource(
        &self,
        gvr: &Gvr,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, Error> {
        let ar = api_resource(gvr);
        let api: Api<DynamicObject> = if namespace.is_empty() {
            Api::all_with(self.client.clone(), &ar)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        };
        get_or_not_found(&api, &gvr.resource, namespace, name).await
    }

    async fn get_pod_disruption_budget(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<PodDisruptionBudget, Error> {
        get_or_not_found(&self.namespaced(namespace), "PodDisruptionBudget", namespace, name)
            .await
    }

    async fn get_horizontal_pod_autoscaler(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<HorizontalPodAutoscaler, Error> {
        get_or_not_found(
            &self.namespaced(namespace),
            "HorizontalPodAutoscaler",
            namespace,
            name,
        )
        .await
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, Error> {
        let pods: Api<Pod> = self.namespaced(namespace);
        Ok(pods.list(&ListParams::default()).await?.items)
    }

    async fn pod_logs(&self, namespace: &str, label_selector: &str) -> Result<String, Error> {
        let api: Api<Pod> = self.namespaced(namespace);
        let pods = api
            .list(&ListParams::default().labels(label_selector))
            .await?
            .items;
        if pods.is_empty() {
            return Err(Error::not_ready(format!(
                "no pods in {} match {}",
                namespace, label_selector
            )));
        }

        let mut sections = Vec::with_capacity(pods.len());
        for pod in pods {
            let name = pod.metadata.name.unwrap_or_default();
            let logs = api.logs(&name, &LogParams::default()).await?;
            sections.push((name, logs));
        }
        Ok(join_pod_logs(&sections))
    }
}

/// One section per pod, headed `==> <pod> <==` like `tail` on several files
fn join_pod_logs(sections: &[(String, String)]) -> String {
    sections
        .iter()
        .map(|(pod, logs)| format!("==> {} <==\n{}", pod, logs.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_resource_uses_plural_for_paths() {
        let ar = api_resource(&Gvr::istio_operator());
        assert_eq!(ar.group, "install.istio.io");
        assert_eq!(ar.version, "v1alpha1");
        assert_eq!(ar.api_version, "install.istio.io/v1alpha1");
        assert_eq!(ar.plural, "istiooperators");
    }

    #[test]
    fn pod_logs_are_headed_by_pod_name() {
        let joined = join_pod_logs(&[
            ("istio-operator-0".to_string(), "reconciling\nerror: timeout\n".to_string()),
            ("istio-operator-1".to_string(), String::new()),
        ]);
        assert_eq!(
            joined,
            "==> istio-operator-0 <==\nreconciling\nerror: timeout\n==> istio-operator-1 <==\n"
        );
    }
}
