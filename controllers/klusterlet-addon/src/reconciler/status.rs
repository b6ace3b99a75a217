//! Configuration status writes.
//!
//! Status is only written when something other than `lastReconciled`
//! changes, so a converged cluster does not keep generating watch events.

use super::Reconciler;
use crate::addons::AddonId;
use crate::classifier::ProvisioningClass;
use crate::error::ControllerError;
use addon_store::StoreError;
use crds::{
    AddonConfigCondition, ConditionStatus, KlusterletAddonConfigStatus, CONDITION_CONVERGED,
    CONDITION_CONVERGENCE_STALLED,
};
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::debug;

impl Reconciler {
    pub(super) async fn write_converged_status(
        &self,
        cluster_name: &str,
        class: ProvisioningClass,
        resolved: &BTreeSet<AddonId>,
        installed: usize,
    ) -> Result<(), ControllerError> {
        let addons: Vec<String> = resolved.iter().map(|id| id.as_str().to_string()).collect();
        let message = format!("{installed} addon installations match the {class} set");

        self.update_status(cluster_name, |status| {
            status.provisioning_class = Some(class.as_str().to_string());
            status.addons = addons.clone();
            status.observed_addons = Some(u32::try_from(installed).unwrap_or(u32::MAX));
            status.set_condition(AddonConfigCondition::new(
                CONDITION_CONVERGED,
                ConditionStatus::True,
                "AddonsConverged",
                message.clone(),
            ));
            status.set_condition(AddonConfigCondition::new(
                CONDITION_CONVERGENCE_STALLED,
                ConditionStatus::False,
                "AddonsConverged",
                "",
            ));
        })
        .await
    }

    pub(super) async fn write_stalled_status(
        &self,
        cluster_name: &str,
        err: &ControllerError,
    ) -> Result<(), ControllerError> {
        let message = err.to_string();

        self.update_status(cluster_name, |status| {
            status.set_condition(AddonConfigCondition::new(
                CONDITION_CONVERGED,
                ConditionStatus::False,
                "ConvergenceFailed",
                message.clone(),
            ));
            status.set_condition(AddonConfigCondition::new(
                CONDITION_CONVERGENCE_STALLED,
                ConditionStatus::True,
                "RetryBudgetExhausted",
                message.clone(),
            ));
        })
        .await
    }

    /// Applies `mutate` to the current status and writes it back if it
    /// changed. A missing configuration is not an error: the next pass
    /// recreates it.
    async fn update_status<F>(&self, cluster_name: &str, mutate: F) -> Result<(), ControllerError>
    where
        F: Fn(&mut KlusterletAddonConfigStatus),
    {
        let configs = &self.stores.configs;
        let mutate = &mutate;

        self.retry(cluster_name, "update configuration status", move || async move {
            let Some(mut config) = configs.get_config(cluster_name, cluster_name).await? else {
                debug!(cluster = %cluster_name, "KlusterletAddonConfig missing, skipping status update");
                return Ok::<(), StoreError>(());
            };

            let current = config.status.clone().unwrap_or_default();
            let mut updated = current.clone();
            mutate(&mut updated);
            if updated == current {
                return Ok(());
            }

            updated.last_reconciled = Some(Utc::now());
            config.status = Some(updated);
            configs.replace_config_status(&config).await?;
            debug!(cluster = %cluster_name, "Updated KlusterletAddonConfig status");
            Ok(())
        })
        .await
    }
}
