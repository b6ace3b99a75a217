//! KlusterletAddonConfig CRD
//!
//! Per-cluster addon configuration. Exactly one exists for every registered
//! cluster, named and namespaced after the cluster.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set once the addon installations match the resolved set.
pub const CONDITION_CONVERGED: &str = "Converged";

/// Condition type set when repeated reconciliation passes keep failing.
pub const CONDITION_CONVERGENCE_STALLED: &str = "ConvergenceStalled";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "agent.open-cluster-management.io",
    version = "v1",
    kind = "KlusterletAddonConfig",
    plural = "klusterletaddonconfigs",
    namespaced,
    status = "KlusterletAddonConfigStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Class","type":"string","jsonPath":".status.provisioningClass"}"#,
    printcolumn = r#"{"name":"Addons","type":"integer","jsonPath":".status.observedAddons"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KlusterletAddonConfigSpec {
    /// Name of the managed cluster this configuration belongs to
    pub cluster_name: String,

    /// Namespace holding the cluster's hub-side objects
    pub cluster_namespace: String,

    /// Application lifecycle agent
    #[serde(default)]
    pub application_manager: AddonAgentConfig,

    /// Certificate policy agent
    #[serde(default)]
    pub cert_policy_controller: AddonAgentConfig,

    /// IAM policy agent
    #[serde(default)]
    pub iam_policy_controller: AddonAgentConfig,

    /// Configuration policy agent and governance policy framework
    #[serde(default)]
    pub policy_controller: AddonAgentConfig,

    /// Search collector agent
    #[serde(default)]
    pub search_collector: AddonAgentConfig,
}

/// Toggle for a single addon agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonAgentConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KlusterletAddonConfigStatus {
    /// Observed conditions (`Converged`, `ConvergenceStalled`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<AddonConfigCondition>,

    /// Provisioning class the addon set was resolved from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_class: Option<String>,

    /// Resolved addon identifiers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<String>,

    /// Number of addon installations observed after the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_addons: Option<u32>,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<DateTime<Utc>>,
}

impl KlusterletAddonConfigStatus {
    /// Looks up a condition by type.
    pub fn condition(&self, type_: &str) -> Option<&AddonConfigCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Inserts or replaces a condition. The transition time is only moved
    /// when the condition status actually changes.
    pub fn set_condition(&mut self, mut condition: AddonConfigCondition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonConfigCondition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl AddonConfigCondition {
    pub fn new(type_: &str, status: ConditionStatus, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            reason: Some(reason.to_string()),
            message: Some(message.into()),
            last_transition_time: Some(Utc::now()),
        }
    }
}

/// Kubernetes condition status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl KlusterletAddonConfig {
    /// Looks up a status condition by type.
    pub fn condition(&self, type_: &str) -> Option<&AddonConfigCondition> {
        self.status.as_ref().and_then(|s| s.condition(type_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut status = KlusterletAddonConfigStatus::default();
        let first = AddonConfigCondition::new(CONDITION_CONVERGED, ConditionStatus::True, "Converged", "4 addons");
        let first_time = first.last_transition_time;
        status.set_condition(first);

        let mut again = AddonConfigCondition::new(CONDITION_CONVERGED, ConditionStatus::True, "Converged", "4 addons");
        again.last_transition_time = None;
        status.set_condition(again);

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].last_transition_time, first_time);
    }

    #[test]
    fn test_set_condition_replaces_on_status_change() {
        let mut status = KlusterletAddonConfigStatus::default();
        status.set_condition(AddonConfigCondition::new(
            CONDITION_CONVERGENCE_STALLED,
            ConditionStatus::False,
            "Progressing",
            "",
        ));
        status.set_condition(AddonConfigCondition::new(
            CONDITION_CONVERGENCE_STALLED,
            ConditionStatus::True,
            "RetryBudgetExhausted",
            "create failed",
        ));

        let cond = status.condition(CONDITION_CONVERGENCE_STALLED).unwrap();
        assert_eq!(cond.status, ConditionStatus::True);
        assert_eq!(cond.reason.as_deref(), Some("RetryBudgetExhausted"));
    }

    #[test]
    fn test_condition_type_serializes_as_type() {
        let cond = AddonConfigCondition::new(CONDITION_CONVERGED, ConditionStatus::True, "Converged", "ok");
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "Converged");
        assert_eq!(json["status"], "True");
    }

    #[test]
    fn test_crd_renders_as_yaml() {
        use kube::CustomResourceExt;

        let yaml = serde_yaml::to_string(&KlusterletAddonConfig::crd()).unwrap();
        assert!(yaml.contains("name: klusterletaddonconfigs.agent.open-cluster-management.io"));
        assert!(yaml.contains("kind: KlusterletAddonConfig"));
        assert!(yaml.contains("status: {}"));
    }
}
