//! Builders for test objects

use crds::{
    ManagedCluster, ManagedClusterAddOn, ManagedClusterAddOnSpec, ManagedClusterSpec, PROVISIONER_ANNOTATION,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Cluster registration with an optional provisioner annotation
pub fn cluster(name: &str, provisioner: Option<&str>) -> ManagedCluster {
    let annotations = provisioner.map(|value| BTreeMap::from([(PROVISIONER_ANNOTATION.to_string(), value.to_string())]));
    ManagedCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            annotations,
            ..Default::default()
        },
        spec: ManagedClusterSpec {
            hub_accepts_client: true,
            lease_duration_seconds: None,
        },
    }
}

/// Cluster provisioned through a HypershiftDeployment
pub fn hypershift_cluster(name: &str) -> ManagedCluster {
    cluster(
        name,
        Some(&format!("{name}.{name}.HypershiftDeployment.cluster.open-cluster-management.io")),
    )
}

/// Cluster provisioned through a ClusterClaim
pub fn claim_cluster(name: &str) -> ManagedCluster {
    cluster(name, Some(&format!("{name}.{name}.ClusterClaim.hive.openshift.io/v1")))
}

/// Bare addon installation
pub fn addon(namespace: &str, name: &str) -> ManagedClusterAddOn {
    ManagedClusterAddOn {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: ManagedClusterAddOnSpec { install_namespace: None },
    }
}
