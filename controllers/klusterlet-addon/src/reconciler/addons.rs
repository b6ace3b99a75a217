//! Converging the addon installations in a cluster's namespace.

use super::Reconciler;
use crate::addons::AddonId;
use crate::error::ControllerError;
use crate::metrics;
use crate::synthesizer::addon_installation;
use addon_store::StoreError;
use crds::KlusterletAddonConfig;
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Set difference between desired and observed addon names:
/// `(to_create, to_delete)`.
pub fn addon_diff(desired: &BTreeSet<String>, observed: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
    let to_create = desired.difference(observed).cloned().collect();
    let to_delete = observed.difference(desired).cloned().collect();
    (to_create, to_delete)
}

impl Reconciler {
    /// Makes the installations in the cluster's namespace equal `resolved`.
    /// Returns how many resolved installations were observed in place
    /// afterwards, which is less than `resolved.len()` while one of them is
    /// still terminating.
    ///
    /// Creates and deletes run independently; one failing does not stop the
    /// others. Installations already being deleted are neither counted nor
    /// deleted again.
    pub(super) async fn converge_addons(
        &self,
        cluster_name: &str,
        config: &KlusterletAddonConfig,
        resolved: &BTreeSet<AddonId>,
    ) -> Result<usize, ControllerError> {
        let observed = self.observed_addons(cluster_name).await?;
        let desired: BTreeSet<String> = resolved.iter().map(|id| id.as_str().to_string()).collect();

        let (to_create, to_delete) = addon_diff(&desired, &observed);
        if to_create.is_empty() && to_delete.is_empty() {
            debug!(cluster = %cluster_name, installed = desired.len(), "Addon installations already converged");
            return Ok(desired.len());
        }
        info!(
            cluster = %cluster_name,
            create = ?to_create,
            delete = ?to_delete,
            "Converging addon installations"
        );

        let creates = join_all(to_create.iter().map(|name| self.create_addon(cluster_name, config, name)));
        let deletes = join_all(to_delete.iter().map(|name| self.delete_addon(cluster_name, name)));
        let (created, deleted) = futures::join!(creates, deletes);

        let total = to_create.len() + to_delete.len();
        let mut failures = Vec::new();
        for result in created.into_iter().chain(deleted) {
            match result {
                Ok(()) => {}
                Err(ControllerError::Terminated(name)) => return Err(ControllerError::Terminated(name)),
                Err(e) => failures.push(e.to_string()),
            }
        }

        if failures.is_empty() {
            let observed = self.observed_addons(cluster_name).await?;
            Ok(observed.intersection(&desired).count())
        } else {
            Err(ControllerError::Reconciliation(format!(
                "{} of {} addon operations failed for cluster {}: {}",
                failures.len(),
                total,
                cluster_name,
                failures.join("; ")
            )))
        }
    }

    /// Names of the installations in the cluster's namespace that are not
    /// being deleted.
    async fn observed_addons(&self, cluster_name: &str) -> Result<BTreeSet<String>, ControllerError> {
        let addons = &self.stores.addons;
        let installed = self
            .retry(cluster_name, "list addon installations", move || addons.list_addons(cluster_name))
            .await?;

        Ok(installed
            .iter()
            .filter(|addon| !addon.is_deleting())
            .filter_map(|addon| addon.metadata.name.clone())
            .collect())
    }

    async fn create_addon(
        &self,
        cluster_name: &str,
        config: &KlusterletAddonConfig,
        addon: &str,
    ) -> Result<(), ControllerError> {
        let installation = addon_installation(config, addon, &self.install_namespace);
        let installation = &installation;
        let addons = &self.stores.addons;
        let what = format!("create addon {addon}");

        match self.retry(cluster_name, &what, move || addons.create_addon(installation)).await {
            Ok(_) => {
                info!(cluster = %cluster_name, addon = %addon, "Created ManagedClusterAddOn");
                metrics::record_addon_created(addon);
                Ok(())
            }
            Err(ControllerError::Store(StoreError::AlreadyExists(_))) => {
                debug!(cluster = %cluster_name, addon = %addon, "ManagedClusterAddOn already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_addon(&self, cluster_name: &str, addon: &str) -> Result<(), ControllerError> {
        let addons = &self.stores.addons;
        let what = format!("delete addon {addon}");

        self.retry(cluster_name, &what, move || addons.delete_addon(cluster_name, addon)).await?;
        info!(cluster = %cluster_name, addon = %addon, "Deleted ManagedClusterAddOn outside the resolved set");
        metrics::record_addon_deleted(addon);
        Ok(())
    }
}
