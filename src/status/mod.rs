//! Installer status reports
//!
//! The installer publishes its health as a status document on its custom
//! resource: one root status plus a status per named component. This module
//! decodes that document ([`InstallStatusReport`]), reduces it to a list of
//! unhealthy entities ([`aggregate`]), and polls the cluster until the
//! reported status is healthy ([`check_install_status`]).

mod aggregate;
mod check;

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::Error;

pub use aggregate::{aggregate, aggregate_statuses, AggregatedError, Entity, UnhealthyEntity};
pub use check::{check_install_status, probe_install_status};

const DECODE_CONTEXT: &str = "install status";

/// Health state of the installation or one of its components.
///
/// Decodes from the enum name (`"HEALTHY"`) or its numeric wire value
/// (`2`). A null or missing value is [`InstallStatus::Unknown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InstallStatus {
    /// No status reported yet
    #[default]
    Unknown,
    /// The installer is still converging
    Reconciling,
    /// Installed and healthy
    Healthy,
    /// Installation failed
    Error,
}

impl InstallStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Reconciling => "RECONCILING",
            Self::Healthy => "HEALTHY",
            Self::Error => "ERROR",
        }
    }

    /// Whether this status counts as healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "UNKNOWN" => Some(Self::Unknown),
            "RECONCILING" => Some(Self::Reconciling),
            "HEALTHY" => Some(Self::Healthy),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    fn from_number(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Reconciling),
            2 => Some(Self::Healthy),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InstallStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InstallStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StatusVisitor;

        impl<'de> Visitor<'de> for StatusVisitor {
            type Value = InstallStatus;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a status name (UNKNOWN, RECONCILING, HEALTHY, ERROR) or 0..=3")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                InstallStatus::from_name(v)
                    .ok_or_else(|| E::custom(format!("unknown install status {:?}", v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                InstallStatus::from_number(v)
                    .ok_or_else(|| E::custom(format!("unknown install status value {}", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .ok()
                    .and_then(InstallStatus::from_number)
                    .ok_or_else(|| E::custom(format!("unknown install status value {}", v)))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(InstallStatus::Unknown)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(InstallStatus::Unknown)
            }
        }

        deserializer.deserialize_any(StatusVisitor)
    }
}

/// Status reported for a single component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Component health
    #[serde(default)]
    pub status: InstallStatus,
    /// Installed version, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Installer error message, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fields this version does not understand; kept, never interpreted
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ComponentStatus {
    /// A component with only a status set
    pub fn new(status: InstallStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// Decoded status document: root status plus per-component statuses.
///
/// Component names are unique and non-empty; the map is ordered by name so
/// aggregation reports failures deterministically. A decoded report is
/// read-only:
///
/// ```compile_fail
/// let mut report = meshcheck::status::InstallStatusReport::default();
/// report.component_status.clear();
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallStatusReport {
    #[serde(default)]
    status: InstallStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    component_status: BTreeMap<String, ComponentStatus>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl InstallStatusReport {
    /// Status of the installation as a whole
    pub fn status(&self) -> InstallStatus {
        self.status
    }

    /// Status per component name, ordered by name
    pub fn components(&self) -> &BTreeMap<String, ComponentStatus> {
        &self.component_status
    }

    /// Top-level fields this version does not understand
    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// Decode a status document already parsed into JSON
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let report: Self =
            serde_json::from_value(value).map_err(|e| Error::decode(DECODE_CONTEXT, e.to_string()))?;
        report.validate()?;
        Ok(report)
    }

    /// Decode a JSON status document
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| Error::decode(DECODE_CONTEXT, e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode a YAML (or JSON) status document
    pub fn from_yaml_str(input: &str) -> Result<Self, Error> {
        let value =
            crate::yaml::load_first(input).map_err(|e| Error::decode(DECODE_CONTEXT, e.to_string()))?;
        Self::from_value(value)
    }

    /// Reduce the report to its unhealthy entities
    pub fn aggregate(&self) -> AggregatedError {
        aggregate(self)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.component_status.keys().any(|name| name.is_empty()) {
            return Err(Error::decode(
                DECODE_CONTEXT,
                "component status entry with empty name",
            ));
        }
        Ok(())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, ComponentStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<BTreeMap<String, ComponentStatus>>::deserialize(deserializer)
        .map(Option::unwrap_or_default)
}
