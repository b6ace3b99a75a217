//! Controller-specific error types.
//!
//! Store failures arrive already classified as `StoreError`; this module adds
//! the errors that only make sense inside the controller.

use addon_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the Klusterlet Addon Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object store error (already retried where retrying made sense)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// One or more convergence operations failed for a cluster
    #[error("Reconciliation failed: {0}")]
    Reconciliation(String),

    /// The cluster registration disappeared or started deleting mid-pass
    #[error("Cluster {0} is gone or being deleted")]
    Terminated(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe/metrics server failed
    #[error("HTTP server error: {0}")]
    Http(#[from] std::io::Error),
}
