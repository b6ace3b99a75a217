//! Cluster classification.
//!
//! The fleet-membership system records who provisioned a cluster in the
//! provisioner annotation:
//!
//! ```text
//! <name>.<namespace>.<Kind>.<api-group>[/<version>]
//! ```
//!
//! Only the kind and API group matter for classification. Names may
//! themselves contain dots, so the kind is located as the first segment
//! starting with an uppercase letter.

use crds::{ManagedCluster, PROVISIONER_ANNOTATION};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

const HYPERSHIFT_KIND: &str = "HypershiftDeployment";
const HYPERSHIFT_GROUP: &str = "cluster.open-cluster-management.io";
const CLAIM_KIND: &str = "ClusterClaim";
const CLAIM_GROUP: &str = "hive.openshift.io";

/// How a cluster was provisioned, which decides its addon set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningClass {
    HypershiftHosted,
    ClaimBased,
    Standard,
}

impl ProvisioningClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningClass::HypershiftHosted => "hypershift-hosted",
            ProvisioningClass::ClaimBased => "claim-based",
            ProvisioningClass::Standard => "standard",
        }
    }
}

impl fmt::Display for ProvisioningClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed provisioner annotation value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerRef {
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub group: String,
    pub version: Option<String>,
}

/// Why a provisioner value could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("provisioner {0:?} is not of the form <name>.<namespace>.<Kind>.<group>[/<version>]")]
    Malformed(String),

    #[error("provisioner kind {kind} in group {group} is not recognized")]
    UnrecognizedKind { kind: String, group: String },
}

/// Parses a provisioner annotation value.
pub fn parse_provisioner(value: &str) -> Result<ProvisionerRef, ClassificationError> {
    let malformed = || ClassificationError::Malformed(value.to_string());

    let (body, version) = match value.split_once('/') {
        Some((body, version)) => {
            if version.is_empty() || version.contains('/') {
                return Err(malformed());
            }
            (body, Some(version.to_string()))
        }
        None => (value, None),
    };

    let segments: Vec<&str> = body.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(malformed());
    }

    let kind_idx = segments
        .iter()
        .position(|s| s.starts_with(|c: char| c.is_ascii_uppercase()))
        .ok_or_else(malformed)?;

    // name and namespace before the kind, at least one group segment after it
    if kind_idx < 2 || kind_idx + 1 >= segments.len() {
        return Err(malformed());
    }
    let kind = segments[kind_idx];
    if !kind.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed());
    }

    Ok(ProvisionerRef {
        name: segments[..kind_idx - 1].join("."),
        namespace: segments[kind_idx - 1].to_string(),
        kind: kind.to_string(),
        group: segments[kind_idx + 1..].join("."),
        version,
    })
}

/// Maps a provisioner value to its class.
pub fn classify_provisioner(value: &str) -> Result<ProvisioningClass, ClassificationError> {
    let provisioner = parse_provisioner(value)?;
    match (provisioner.kind.as_str(), provisioner.group.as_str()) {
        (HYPERSHIFT_KIND, HYPERSHIFT_GROUP) => Ok(ProvisioningClass::HypershiftHosted),
        (CLAIM_KIND, CLAIM_GROUP) => Ok(ProvisioningClass::ClaimBased),
        _ => Err(ClassificationError::UnrecognizedKind {
            kind: provisioner.kind,
            group: provisioner.group,
        }),
    }
}

/// Classifies a cluster from its annotations.
///
/// Total: a missing annotation is `Standard`, and so is a value that cannot
/// be classified (logged as a warning, never an error).
pub fn classify(annotations: &BTreeMap<String, String>) -> ProvisioningClass {
    let Some(value) = annotations.get(PROVISIONER_ANNOTATION) else {
        return ProvisioningClass::Standard;
    };

    match classify_provisioner(value) {
        Ok(class) => {
            debug!(provisioner = %value, class = %class, "Classified cluster");
            class
        }
        Err(e) => {
            warn!(provisioner = %value, "Ambiguous provisioner, treating cluster as standard: {}", e);
            ProvisioningClass::Standard
        }
    }
}

/// Classifies a cluster registration.
pub fn classify_cluster(cluster: &ManagedCluster) -> ProvisioningClass {
    match cluster.metadata.annotations.as_ref() {
        Some(annotations) => classify(annotations),
        None => ProvisioningClass::Standard,
    }
}
