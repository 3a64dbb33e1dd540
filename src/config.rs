//! Verification settings
//!
//! By default the status check polls for 100s with a 1s delay and each
//! manifest object gets 30s with a 100ms delay.
//! Settings can be loaded from a YAML or JSON file (camelCase keys,
//! durations in milliseconds) and are then overridden by CLI flags.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::reconcile::FailureMode;
use crate::retry::RetryPolicy;
use crate::{
    Error, DEFAULT_INSTALL_NAME, ISTIO_NAMESPACE, OPERATOR_NAMESPACE, OPERATOR_POD_SELECTOR,
    OPERATOR_SERVICE,
};

/// Everything a verification run needs to know besides the manifest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyConfig {
    /// Namespace holding the control plane and its install resource
    pub control_plane_namespace: String,
    /// Name of the installer's custom resource
    pub install_name: String,
    /// Namespace the operator runs in
    pub operator_namespace: String,
    /// Service fronting the operator
    pub operator_service: String,
    /// Label selector for the operator's pods, whose logs are captured when
    /// the status check times out
    pub operator_pod_selector: String,
    /// Poll policy for the install status check
    pub status_policy: RetryPolicy,
    /// Poll policy for control-plane pod readiness
    pub pods_policy: RetryPolicy,
    /// Poll policy for each manifest object
    pub object_policy: RetryPolicy,
    /// Whether to wait for control-plane pods before reconciling
    pub check_pods: bool,
    /// What to do when a manifest object is missing
    pub failure_mode: FailureMode,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            control_plane_namespace: ISTIO_NAMESPACE.to_string(),
            install_name: DEFAULT_INSTALL_NAME.to_string(),
            operator_namespace: OPERATOR_NAMESPACE.to_string(),
            operator_service: OPERATOR_SERVICE.to_string(),
            operator_pod_selector: OPERATOR_POD_SELECTOR.to_string(),
            status_policy: RetryPolicy::install_status(),
            pods_policy: RetryPolicy::install_status(),
            object_policy: RetryPolicy::object_lookup(),
            check_pods: true,
            failure_mode: FailureMode::default(),
        }
    }
}

impl VerifyConfig {
    /// Parse settings from YAML or JSON text; missing keys keep defaults
    pub fn from_yaml_str(input: &str) -> Result<Self, Error> {
        let value = crate::yaml::load_first(input)
            .map_err(|e| Error::config(format!("invalid config: {}", e)))?;
        let config: Self = if value.is_null() {
            Self::default()
        } else {
            serde_json::from_value(value)
                .map_err(|e| Error::config(format!("invalid config: {}", e)))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a file
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Check names are set and every policy can make progress
    pub fn validate(&self) -> Result<(), Error> {
        let names = [
            ("controlPlaneNamespace", &self.control_plane_namespace),
            ("installName", &self.install_name),
            ("operatorNamespace", &self.operator_namespace),
            ("operatorService", &self.operator_service),
            ("operatorPodSelector", &self.operator_pod_selector),
        ];
        for (field, value) in names {
            if value.is_empty() {
                return Err(Error::config(format!("{} must not be empty", field)));
            }
        }

        self.status_policy.validate()?;
        self.pods_policy.validate()?;
        self.object_policy.validate()
    }
}
