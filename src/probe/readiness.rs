//! Pod readiness checks

use k8s_openapi::api::core::v1::Pod;
use tracing::info;

use super::ClusterResourceProbe;
use crate::retry::{poll, RetryPolicy};
use crate::Error;

const PHASE_RUNNING: &str = "Running";
const PHASE_SUCCEEDED: &str = "Succeeded";

/// Whether a single pod is ready.
///
/// Completed pods count as ready. Running pods are ready once every
/// container reports ready.
pub fn pod_ready(pod: &Pod) -> Result<(), String> {
    let name = pod.metadata.name.as_deref().unwrap_or("<unnamed>");
    let status = pod.status.as_ref();
    let phase = status.and_then(|s| s.phase.as_deref()).unwrap_or("Unknown");

    match phase {
        PHASE_SUCCEEDED => Ok(()),
        PHASE_RUNNING => {
            let containers = status
                .and_then(|s| s.container_statuses.as_deref())
                .unwrap_or_default();
            if containers.is_empty() {
                return Err(format!("pod {} has no container statuses", name));
            }
            match containers.iter().find(|c| !c.ready) {
                Some(c) => Err(format!("pod {} container {} is not ready", name, c.name)),
                None => Ok(()),
            }
        }
        other => Err(format!("pod {} is in phase {}", name, other)),
    }
}

/// One readiness pass over every pod in `namespace`; returns the pod count
pub async fn pods_ready<P>(probe: &P, namespace: &str) -> Result<usize, Error>
where
    P: ClusterResourceProbe + ?Sized,
{
    let pods = probe.list_pods(namespace).await?;
    if pods.is_empty() {
        return Err(Error::not_ready(format!("no pods found in {}", namespace)));
    }
    for pod in &pods {
        pod_ready(pod).map_err(Error::not_ready)?;
    }
    Ok(pods.len())
}

/// Poll until every pod in `namespace` is ready
pub async fn check_pods_ready<P>(
    probe: &P,
    namespace: &str,
    policy: &RetryPolicy,
) -> Result<usize, Error>
where
    P: ClusterResourceProbe + ?Sized,
{
    let operation = format!("pods ready in {}", namespace);
    let count = poll(policy, &operation, || pods_ready(probe, namespace)).await?;
    info!(namespace = %namespace, pods = count, "All pods ready");
    Ok(count)
}
