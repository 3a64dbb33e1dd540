//! Shared setup for live-cluster tests

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;

use meshcheck::probe::KubeResourceProbe;

/// Connect to the current kubeconfig context
pub async fn ensure_test_cluster() -> Result<Client, String> {
    Client::try_default()
        .await
        .map_err(|e| format!("no cluster available (is kind running?): {}", e))
}

/// Probe sharing the test client
pub fn probe(client: &Client) -> KubeResourceProbe {
    KubeResourceProbe::new(client.clone())
}

/// Create a fresh namespace, deleting any leftover from a previous run
pub async fn fresh_namespace(client: &Client, name: &str) -> Result<(), String> {
    let api: Api<Namespace> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;

    // Deletion is asynchronous; wait for the old namespace to go away
    for _ in 0..60 {
        match api.get_opt(name).await {
            Ok(None) => break,
            Ok(Some(_)) => tokio::time::sleep(std::time::Duration::from_secs(1)).await,
            Err(e) => return Err(format!("failed to read namespace {}: {}", name, e)),
        }
    }

    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    api.create(&PostParams::default(), &namespace)
        .await
        .map_err(|e| format!("failed to create namespace {}: {}", name, e))?;
    Ok(())
}

/// Best-effort namespace removal
pub async fn cleanup_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}
