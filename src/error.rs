//! Error types for installation verification
//!
//! Errors fall into two groups. Transient conditions (`NotReady`, `NotFound`,
//! `Unhealthy`, `Kube`) are retried by [`crate::retry::poll`] until its
//! timeout expires. Everything else short-circuits the poll and is fatal to
//! the check that raised it.

use std::time::Duration;

use thiserror::Error;

use crate::reconcile::MismatchList;
use crate::status::AggregatedError;

/// Main error type for verification operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Malformed status payload or manifest document
    #[error("decode error [{context}]: {message}")]
    Decode {
        /// What was being decoded (e.g., "install status", "manifest")
        context: String,
        /// Description of what's malformed
        message: String,
    },

    /// A resource the check depends on does not exist (yet)
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource namespace, empty for cluster-scoped resources
        namespace: String,
        /// Resource name
        name: String,
    },

    /// A dependency exists but is not ready yet
    #[error("not ready: {message}")]
    NotReady {
        /// Description of what isn't ready
        message: String,
    },

    /// Reported install status contains unhealthy entities
    #[error("install status not healthy: {0}")]
    Unhealthy(AggregatedError),

    /// A poll exhausted its budget
    #[error("{operation} timed out after {elapsed:?}: {last}")]
    Timeout {
        /// Name of the polled operation
        operation: String,
        /// Wall time spent polling
        elapsed: Duration,
        /// The last failure observed before giving up
        last: Box<Error>,
    },

    /// Expected objects could not be found in the cluster
    #[error("in-cluster resources do not match the manifest: {0}")]
    Mismatch(MismatchList),

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Context where the error occurred
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a decode error with context
    pub fn decode(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decode {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for a namespaced or cluster-scoped resource
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a not-ready error with the given message
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady {
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Whether the poller should try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Kube { .. } | Self::NotFound { .. } | Self::NotReady { .. } | Self::Unhealthy(_)
        )
    }

    /// For a timeout, the last failure observed; otherwise the error itself
    pub fn last_cause(&self) -> &Error {
        match self {
            Self::Timeout { last, .. } => last.last_cause(),
            other => other,
        }
    }
}
