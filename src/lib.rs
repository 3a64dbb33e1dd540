//! meshcheck - installation verification for service mesh control planes
//!
//! Given the status an installer reports and the manifest it was asked to
//! apply, meshcheck decides whether the live cluster matches, polling with a
//! bounded timeout to ride out eventual consistency.
//!
//! # Modules
//!
//! - [`retry`] - Bounded fixed-delay polling
//! - [`status`] - Status document decoding, aggregation and the status check
//! - [`probe`] - Read-only cluster lookups (trait + kube-rs implementation)
//! - [`manifest`] - Multi-document manifest parsing
//! - [`reconcile`] - Kind registry and manifest-vs-cluster reconciliation
//! - [`verify`] - The full verification run
//! - [`config`] - Verification settings
//! - [`telemetry`] - Tracing setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod manifest;
pub mod probe;
pub mod reconcile;
pub mod retry;
pub mod status;
pub mod telemetry;
pub mod verify;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Namespace the control plane is installed into
pub const ISTIO_NAMESPACE: &str = "istio-system";

/// Namespace the installer operator runs in
pub const OPERATOR_NAMESPACE: &str = "istio-operator";

/// Service fronting the installer operator
pub const OPERATOR_SERVICE: &str = "istio-operator";

/// Default name of the operator-managed install resource
pub const DEFAULT_INSTALL_NAME: &str = "test-istiocontrolplane";

/// Label selector for the operator's pods
pub const OPERATOR_POD_SELECTOR: &str = "name=istio-operator";
