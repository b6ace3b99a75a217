//! Open Cluster Management CRD Definitions
//!
//! Kubernetes Custom Resource types consumed and produced by the
//! klusterlet addon controller:
//! - `ManagedCluster`: cluster registration (read-only to the controller)
//! - `KlusterletAddonConfig`: per-cluster addon configuration (owned)
//! - `ManagedClusterAddOn`: per-cluster, per-addon installation (owned)

pub mod labels;
pub mod managed_cluster;
pub mod klusterlet_addon_config;
pub mod managed_cluster_addon;

pub use labels::*;
pub use managed_cluster::*;
pub use klusterlet_addon_config::*;
pub use managed_cluster_addon::*;
