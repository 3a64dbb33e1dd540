//! Polling the installer's reported status

use tracing::{debug, info, warn};

use super::InstallStatusReport;
use crate::config::VerifyConfig;
use crate::probe::{pods_ready, ClusterResourceProbe, Gvr};
use crate::retry::poll;
use crate::Error;

/// One attempt at reading a healthy status report.
///
/// A report with no `status` yet means the operator may not be running, so
/// the operator Service and pods are checked to give a better reason. Every
/// outcome except a malformed status is retryable.
pub async fn probe_install_status<P>(
    probe: &P,
    config: &VerifyConfig,
) -> Result<InstallStatusReport, Error>
where
    P: ClusterResourceProbe + ?Sized,
{
    let gvr = Gvr::istio_operator();
    let resource = probe
        .get_custom_resource(&gvr, &config.control_plane_namespace, &config.install_name)
        .await
        .map_err(|e| Error::not_ready(format!("failed to get install resource: {}", e)))?;

    let status = match resource.data.get("status") {
        Some(status) if !status.is_null() => status.clone(),
        _ => {
            if let Err(e) = probe
                .get_service(&config.operator_namespace, &config.operator_service)
                .await
            {
                return Err(Error::not_ready(format!("operator service is not ready: {}", e)));
            }
            if let Err(e) = pods_ready(probe, &config.operator_namespace).await {
                return Err(Error::not_ready(format!("operator pod is not ready: {}", e)));
            }
            return Err(Error::not_ready("status not found on the install resource"));
        }
    };

    let report = InstallStatusReport::from_value(status)?;
    debug!(
        status = %report.status(),
        components = report.components().len(),
        "Decoded install status"
    );
    report.aggregate().into_result()?;
    Ok(report)
}

/// Poll until the installer reports itself and every component healthy
pub async fn check_install_status<P>(
    probe: &P,
    config: &VerifyConfig,
) -> Result<InstallStatusReport, Error>
where
    P: ClusterResourceProbe + ?Sized,
{
    info!(
        namespace = %config.control_plane_namespace,
        name = %config.install_name,
        "Checking install status"
    );
    let polled = poll(&config.status_policy, "install status", || {
        probe_install_status(probe, config)
    })
    .await;
    let report = match polled {
        Ok(report) => report,
        Err(err @ Error::Timeout { .. }) => {
            log_operator_pods(probe, config).await;
            return Err(err);
        }
        Err(err) => return Err(err),
    };
    info!(components = report.components().len(), "Install status healthy");
    Ok(report)
}

/// Dump the operator's logs so a stuck install can be diagnosed from the
/// verifier's output alone
async fn log_operator_pods<P>(probe: &P, config: &VerifyConfig)
where
    P: ClusterResourceProbe + ?Sized,
{
    match probe
        .pod_logs(&config.operator_namespace, &config.operator_pod_selector)
        .await
    {
        Ok(logs) => info!(
            namespace = %config.operator_namespace,
            selector = %config.operator_pod_selector,
            "Install status not healthy, operator logs:\n{}",
            logs
        ),
        Err(e) => warn!(
            namespace = %config.operator_namespace,
            selector = %config.operator_pod_selector,
            error = %e,
            "Install status not healthy and operator logs are unavailable"
        ),
    }
}
