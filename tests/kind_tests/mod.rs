//! Integration tests for meshcheck
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! an installer's output is checked against what actually landed.
//!
//! # Test Organization
//!
//! - `manifest_reconcile`: Stories about creating objects through the API and
//!   reconciling a manifest against them
//!
//! - `install_status`: Stories about reading installer status from a custom
//!   resource when its CRD is installed
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --nocapture
//! ```

mod helpers;
mod install_status;
mod manifest_reconcile;
