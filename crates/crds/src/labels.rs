//! Well-known annotation and label keys.

/// Annotation set by the fleet-membership system naming the object that
/// provisioned a cluster, e.g. `name.ns.ClusterClaim.hive.openshift.io/v1`.
pub const PROVISIONER_ANNOTATION: &str = "cluster.open-cluster-management.io/provisioner";

/// Label marking objects created by this controller.
pub const MANAGED_BY_LABEL: &str = "addon.open-cluster-management.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on objects created by this controller.
pub const MANAGED_BY_VALUE: &str = "klusterlet-addon-controller";

/// Annotation recording the provisioning class a configuration was derived from.
pub const PROVISIONING_CLASS_ANNOTATION: &str = "agent.open-cluster-management.io/provisioning-class";

/// Default namespace on the managed cluster where addon agents are installed.
pub const DEFAULT_ADDON_INSTALL_NAMESPACE: &str = "open-cluster-management-agent-addon";
