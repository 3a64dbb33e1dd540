//! Reduction of a status report to its unhealthy entities

use std::collections::BTreeMap;
use std::fmt;

use super::{ComponentStatus, InstallStatus, InstallStatusReport};
use crate::Error;

/// Which part of the installation a status belongs to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entity {
    /// The installation as a whole
    Root,
    /// A named component
    Component(String),
}

/// One entity whose status is not HEALTHY
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnhealthyEntity {
    /// The entity
    pub entity: Entity,
    /// Its reported status
    pub status: InstallStatus,
    /// Error message reported alongside the status, if any
    pub error: Option<String>,
}

impl fmt::Display for UnhealthyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Entity::Root => write!(f, "got install status: {}", self.status)?,
            Entity::Component(name) => {
                write!(f, "got component: {} status: {}", name, self.status)?
            }
        }
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}

/// Unhealthy entities of one report, root first, then components by name.
///
/// Empty means everything is healthy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregatedError(Vec<UnhealthyEntity>);

impl AggregatedError {
    /// True when every entity was healthy
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of unhealthy entities
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the unhealthy entities
    pub fn iter(&self) -> impl Iterator<Item = &UnhealthyEntity> {
        self.0.iter()
    }

    /// `Ok(())` when empty, otherwise [`Error::Unhealthy`]
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Unhealthy(self))
        }
    }
}

impl From<Vec<UnhealthyEntity>> for AggregatedError {
    fn from(entities: Vec<UnhealthyEntity>) -> Self {
        Self(entities)
    }
}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entity) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", entity)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedError {}

/// Aggregate a decoded report
pub fn aggregate(report: &InstallStatusReport) -> AggregatedError {
    aggregate_statuses(report.status, &report.component_status)
}

/// Collect one entry for the root if it is not HEALTHY, plus one per
/// component that is not HEALTHY, in component-name order.
pub fn aggregate_statuses(
    root: InstallStatus,
    components: &BTreeMap<String, ComponentStatus>,
) -> AggregatedError {
    let mut unhealthy = Vec::new();

    if !root.is_healthy() {
        unhealthy.push(UnhealthyEntity {
            entity: Entity::Root,
            status: root,
            error: None,
        });
    }

    for (name, component) in components {
        if !component.status.is_healthy() {
            unhealthy.push(UnhealthyEntity {
                entity: Entity::Component(name.clone()),
                status: component.status,
                error: component.error.clone(),
            });
        }
    }

    AggregatedError(unhealthy)
}
