//! Object store errors

use thiserror::Error;

/// Errors that can occur when talking to an object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error not covered by a more specific variant
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create of an object that already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Conditional write lost against a newer version
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network failure, throttling or server-side error
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Object is missing a field the store needs (name, namespace, version)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Watch stream failure
    #[error("Watch error: {0}")]
    Watch(String),
}

impl StoreError {
    /// Classifies a Kubernetes error.
    ///
    /// 404 becomes `NotFound`, 409 `AlreadyExists` or `Conflict` depending on
    /// the reason, 429 and 5xx `Transient`. Everything else is kept as `Kube`.
    pub fn from_kube(err: kube::Error, what: &str) -> Self {
        if let kube::Error::Api(response) = &err {
            match response.code {
                404 => return StoreError::NotFound(what.to_string()),
                409 if response.reason == "AlreadyExists" => {
                    return StoreError::AlreadyExists(what.to_string());
                }
                409 => return StoreError::Conflict(format!("{what}: {}", response.message)),
                429 | 500..=599 => return StoreError::Transient(format!("{what}: {}", response.message)),
                _ => {}
            }
        }
        StoreError::Kube(err)
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) | StoreError::Conflict(_) | StoreError::Watch(_) => true,
            // Anything that is not an API status is a connection-level failure
            StoreError::Kube(err) => !matches!(err, kube::Error::Api(_)),
            StoreError::NotFound(_)
            | StoreError::AlreadyExists(_)
            | StoreError::InvalidObject(_)
            | StoreError::Serialization(_) => false,
        }
    }
}
