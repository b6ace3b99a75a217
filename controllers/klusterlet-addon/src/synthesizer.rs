//! Builds the desired objects for a cluster.
//!
//! Everything here is pure: same inputs, same object, field for field.

use crate::addons::{AddonId, AddonResolver};
use crate::classifier::ProvisioningClass;
use crds::{
    KlusterletAddonConfig, KlusterletAddonConfigSpec, ManagedClusterAddOn, ManagedClusterAddOnSpec,
    MANAGED_BY_LABEL, MANAGED_BY_VALUE, PROVISIONING_CLASS_ANNOTATION,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::{BTreeMap, BTreeSet};

fn managed_by_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])
}

/// Canonical configuration for a cluster: named and namespaced after the
/// cluster, one flag enabled per agent that serves a resolved addon.
pub fn synthesize(cluster_name: &str, class: ProvisioningClass, resolver: &AddonResolver) -> KlusterletAddonConfig {
    KlusterletAddonConfig {
        metadata: ObjectMeta {
            name: Some(cluster_name.to_string()),
            namespace: Some(cluster_name.to_string()),
            labels: Some(managed_by_labels()),
            annotations: Some(BTreeMap::from([(
                PROVISIONING_CLASS_ANNOTATION.to_string(),
                class.as_str().to_string(),
            )])),
            ..Default::default()
        },
        spec: config_spec(cluster_name, &resolver.resolve(class)),
        status: None,
    }
}

/// Spec with flags derived from an addon set.
pub fn config_spec(cluster_name: &str, addons: &BTreeSet<AddonId>) -> KlusterletAddonConfigSpec {
    let mut spec = KlusterletAddonConfigSpec {
        cluster_name: cluster_name.to_string(),
        cluster_namespace: cluster_name.to_string(),
        ..Default::default()
    };
    for addon in addons {
        addon.agent_flag().enable(&mut spec);
    }
    spec
}

/// True if `existing` no longer matches what `synthesize` would produce.
///
/// Only the spec and the keys this controller owns are compared; labels or
/// annotations added by others are left alone.
pub fn config_drifted(existing: &KlusterletAddonConfig, desired: &KlusterletAddonConfig) -> bool {
    if existing.spec != desired.spec {
        return true;
    }
    let owned_missing = |have: &Option<BTreeMap<String, String>>, want: &Option<BTreeMap<String, String>>| {
        want.iter().flatten().any(|(k, v)| have.as_ref().and_then(|m| m.get(k)) != Some(v))
    };
    owned_missing(&existing.metadata.labels, &desired.metadata.labels)
        || owned_missing(&existing.metadata.annotations, &desired.metadata.annotations)
}

/// Applies the desired spec and owned metadata onto the observed object,
/// keeping its resourceVersion for a conditional replace.
pub fn repair_config(existing: &KlusterletAddonConfig, desired: &KlusterletAddonConfig) -> KlusterletAddonConfig {
    let mut repaired = existing.clone();
    repaired.spec = desired.spec.clone();
    for (k, v) in desired.metadata.labels.iter().flatten() {
        repaired.metadata.labels.get_or_insert_with(BTreeMap::new).insert(k.clone(), v.clone());
    }
    for (k, v) in desired.metadata.annotations.iter().flatten() {
        repaired
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(k.clone(), v.clone());
    }
    repaired
}

/// Installation object for one addon in the cluster's namespace, owned by
/// the cluster's configuration when its uid is known.
pub fn addon_installation(config: &KlusterletAddonConfig, addon: &str, install_namespace: &str) -> ManagedClusterAddOn {
    ManagedClusterAddOn {
        metadata: ObjectMeta {
            name: Some(addon.to_string()),
            namespace: config.metadata.namespace.clone(),
            labels: Some(managed_by_labels()),
            owner_references: config.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        spec: ManagedClusterAddOnSpec {
            install_namespace: Some(install_namespace.to_string()),
        },
    }
}
