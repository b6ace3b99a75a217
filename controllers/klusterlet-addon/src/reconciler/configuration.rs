//! Keeping the cluster's `KlusterletAddonConfig` in place.

use super::{ClusterPhase, Reconciler};
use crate::error::ControllerError;
use crate::metrics;
use crate::synthesizer::{config_drifted, repair_config};
use addon_store::StoreError;
use crds::KlusterletAddonConfig;
use tracing::info;

/// Result of one attempt at making the configuration match.
enum ConfigState {
    Unchanged(KlusterletAddonConfig),
    Created { config: KlusterletAddonConfig, recreated: bool },
    Repaired(KlusterletAddonConfig),
    /// An earlier configuration is still finalizing its deletion
    Deleting,
}

impl Reconciler {
    /// Creates or repairs the configuration. Returns `None` while a
    /// previous configuration is still being deleted.
    pub(super) async fn ensure_configuration(
        &self,
        cluster_name: &str,
        desired: &KlusterletAddonConfig,
    ) -> Result<Option<KlusterletAddonConfig>, ControllerError> {
        if self.phase(cluster_name) == ClusterPhase::Unobserved {
            self.set_phase(cluster_name, ClusterPhase::ConfigurationPending);
        }

        let state = self
            .retry(cluster_name, "ensure configuration", move || self.apply_configuration(cluster_name, desired))
            .await?;

        let config = match state {
            ConfigState::Unchanged(config) => config,
            ConfigState::Created { config, recreated } => {
                if recreated {
                    info!(cluster = %cluster_name, "Recreated deleted KlusterletAddonConfig");
                    metrics::record_config_write("recreated");
                } else {
                    info!(cluster = %cluster_name, "Created KlusterletAddonConfig");
                    metrics::record_config_write("created");
                }
                config
            }
            ConfigState::Repaired(config) => {
                info!(cluster = %cluster_name, "Restored drifted KlusterletAddonConfig spec");
                metrics::record_config_write("repaired");
                config
            }
            ConfigState::Deleting => {
                info!(cluster = %cluster_name, "KlusterletAddonConfig is being deleted, waiting to recreate it");
                self.set_phase(cluster_name, ClusterPhase::ConfigurationPending);
                return Ok(None);
            }
        };

        self.set_phase(cluster_name, ClusterPhase::ConfigurationPresent);
        Ok(Some(config))
    }

    /// One read-then-write attempt. Every attempt starts from a fresh read,
    /// so a conflict on the conditional replace is resolved by retrying.
    async fn apply_configuration(
        &self,
        cluster_name: &str,
        desired: &KlusterletAddonConfig,
    ) -> Result<ConfigState, StoreError> {
        let configs = &self.stores.configs;

        let existing = match configs.get_config(cluster_name, cluster_name).await? {
            Some(existing) => existing,
            None => {
                let previous = self.set_phase(cluster_name, ClusterPhase::ConfigurationPending);
                if previous.has_configuration() {
                    info!(cluster = %cluster_name, "KlusterletAddonConfig was deleted, recreating it");
                }
                match configs.create_config(desired).await {
                    Ok(config) => {
                        return Ok(ConfigState::Created {
                            config,
                            recreated: previous.has_configuration(),
                        });
                    }
                    // Someone else created it between our read and write
                    Err(StoreError::AlreadyExists(_)) => configs
                        .get_config(cluster_name, cluster_name)
                        .await?
                        .ok_or_else(|| {
                            StoreError::Conflict(format!(
                                "KlusterletAddonConfig {cluster_name} disappeared after a create conflict"
                            ))
                        })?,
                    Err(e) => return Err(e),
                }
            }
        };

        if existing.metadata.deletion_timestamp.is_some() {
            return Ok(ConfigState::Deleting);
        }

        if config_drifted(&existing, desired) {
            let repaired = repair_config(&existing, desired);
            return Ok(ConfigState::Repaired(configs.replace_config(&repaired).await?));
        }

        Ok(ConfigState::Unchanged(existing))
    }
}
