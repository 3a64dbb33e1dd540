//! Install status and readiness checks against a live API server

use std::time::Duration;

use meshcheck::config::VerifyConfig;
use meshcheck::probe::check_pods_ready;
use meshcheck::retry::RetryPolicy;
use meshcheck::status::check_install_status;
use meshcheck::Error;

use super::helpers::{ensure_test_cluster, probe};

/// Story: verification runs against a cluster where no installer has run
///
/// Without the installer's CRD the status resource cannot be read. The check
/// keeps polling and finally times out with the lookup failure as its cause.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_status_check_times_out_without_installer() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let config = VerifyConfig {
        status_policy: RetryPolicy::new(Duration::from_secs(3), Duration::from_millis(500)),
        ..Default::default()
    };

    let err = check_install_status(&probe(&client), &config)
        .await
        .expect_err("no installer is present");

    match err {
        Error::Timeout { last, .. } => {
            assert!(last.to_string().contains("failed to get install resource"));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

/// Story: system pods of a healthy kind cluster are all ready
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_kube_system_pods_are_ready() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");

    let count = check_pods_ready(
        &probe(&client),
        "kube-system",
        &RetryPolicy::new(Duration::from_secs(60), Duration::from_secs(2)),
    )
    .await
    .expect("kube-system pods should be ready");

    assert!(count > 0);
}
