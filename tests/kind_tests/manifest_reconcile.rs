//! Manifest reconciliation against a live API server

use std::time::Duration;

use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount, ServicePort, ServiceSpec};
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;

use meshcheck::reconcile::{FailureMode, ManifestDiffer};
use meshcheck::retry::RetryPolicy;
use meshcheck::Error;

use super::helpers::{cleanup_namespace, ensure_test_cluster, fresh_namespace, probe};

fn meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

async fn create_control_plane_objects(client: &Client, namespace: &str) {
    let post = PostParams::default();

    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    accounts
        .create(
            &post,
            &ServiceAccount {
                metadata: meta(namespace, "istiod"),
                ..Default::default()
            },
        )
        .await
        .expect("failed to create service account");

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    config_maps
        .create(
            &post,
            &ConfigMap {
                metadata: meta(namespace, "istio"),
                ..Default::default()
            },
        )
        .await
        .expect("failed to create config map");

    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    services
        .create(
            &post,
            &Service {
                metadata: meta(namespace, "istiod"),
                spec: Some(ServiceSpec {
                    ports: Some(vec![ServicePort {
                        port: 15012,
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .expect("failed to create service");
}

fn manifest(namespace: &str) -> String {
    format!(
        r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: istiod
  namespace: {ns}
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: istio
  namespace: {ns}
---
apiVersion: v1
kind: Service
metadata:
  name: istiod
  namespace: {ns}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: istiod
  namespace: {ns}
"#,
        ns = namespace
    )
}

/// Story: objects an installer created are all found
///
/// Expected behavior:
/// - every registered kind in the manifest is looked up and found
/// - the Role, which has no lookup, is reported as skipped
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_installed_objects_reconcile() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = "meshcheck-reconcile";
    fresh_namespace(&client, namespace)
        .await
        .expect("failed to create namespace");
    create_control_plane_objects(&client, namespace).await;

    let differ = ManifestDiffer::new(RetryPolicy::object_lookup()).expect("valid policy");
    let report = differ
        .reconcile(&manifest(namespace), &probe(&client))
        .await
        .expect("manifest should reconcile");

    assert_eq!(report.verified.len(), 3);
    assert_eq!(report.skipped.len(), 1);

    cleanup_namespace(&client, namespace).await;
}

/// Story: an object the installer never created is reported by name
///
/// Expected behavior:
/// - the lookup for the missing Deployment polls until its budget is spent
/// - the mismatch names the Deployment, and nothing else with collect-all
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_missing_deployment_is_reported() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = "meshcheck-missing";
    fresh_namespace(&client, namespace)
        .await
        .expect("failed to create namespace");
    create_control_plane_objects(&client, namespace).await;

    let mut manifest = manifest(namespace);
    manifest.push_str(&format!(
        "---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: istiod\n  namespace: {}\n",
        namespace
    ));

    let differ = ManifestDiffer::new(RetryPolicy::new(
        Duration::from_secs(3),
        Duration::from_millis(500),
    ))
    .expect("valid policy")
    .with_failure_mode(FailureMode::CollectAll);
    let err = differ
        .reconcile(&manifest, &probe(&client))
        .await
        .expect_err("missing deployment should fail reconciliation");

    match err {
        Error::Mismatch(mismatches) => {
            assert_eq!(mismatches.len(), 1);
            let missing = mismatches.iter().next().expect("one mismatch");
            assert_eq!(missing.object.kind, "Deployment");
            assert!(matches!(missing.cause.last_cause(), Error::NotFound { .. }));
        }
        other => panic!("expected mismatch, got {:?}", other),
    }

    cleanup_namespace(&client, namespace).await;
}
