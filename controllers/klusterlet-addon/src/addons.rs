//! Addon catalogue and the per-class addon set table.

use crate::classifier::ProvisioningClass;
use crate::error::ControllerError;
use crds::KlusterletAddonConfigSpec;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// An addon this controller knows how to install.
///
/// Ordering follows the identifier strings so sets iterate alphabetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddonId {
    ApplicationManager,
    CertPolicyController,
    ConfigPolicyController,
    GovernancePolicyFramework,
    IamPolicyController,
    SearchCollector,
}

/// Agent toggle in the configuration spec. Each addon belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentFlag {
    ApplicationManager,
    CertPolicyController,
    IamPolicyController,
    PolicyController,
    SearchCollector,
}

impl AddonId {
    pub const ALL: [AddonId; 6] = [
        AddonId::ApplicationManager,
        AddonId::CertPolicyController,
        AddonId::ConfigPolicyController,
        AddonId::GovernancePolicyFramework,
        AddonId::IamPolicyController,
        AddonId::SearchCollector,
    ];

    /// Name of the `ManagedClusterAddOn` object.
    pub fn as_str(&self) -> &'static str {
        match self {
            AddonId::ApplicationManager => "application-manager",
            AddonId::CertPolicyController => "cert-policy-controller",
            AddonId::ConfigPolicyController => "config-policy-controller",
            AddonId::GovernancePolicyFramework => "governance-policy-framework",
            AddonId::IamPolicyController => "iam-policy-controller",
            AddonId::SearchCollector => "search-collector",
        }
    }

    pub fn agent_flag(&self) -> AgentFlag {
        match self {
            AddonId::ApplicationManager => AgentFlag::ApplicationManager,
            AddonId::CertPolicyController => AgentFlag::CertPolicyController,
            AddonId::ConfigPolicyController | AddonId::GovernancePolicyFramework => AgentFlag::PolicyController,
            AddonId::IamPolicyController => AgentFlag::IamPolicyController,
            AddonId::SearchCollector => AgentFlag::SearchCollector,
        }
    }
}

impl fmt::Display for AddonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddonId {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AddonId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ControllerError::InvalidConfig(format!("unknown addon {s:?}")))
    }
}

impl AgentFlag {
    /// Sets this agent's flag on a configuration spec.
    pub fn enable(&self, spec: &mut KlusterletAddonConfigSpec) {
        let flag = match self {
            AgentFlag::ApplicationManager => &mut spec.application_manager,
            AgentFlag::CertPolicyController => &mut spec.cert_policy_controller,
            AgentFlag::IamPolicyController => &mut spec.iam_policy_controller,
            AgentFlag::PolicyController => &mut spec.policy_controller,
            AgentFlag::SearchCollector => &mut spec.search_collector,
        };
        flag.enabled = true;
    }
}

const HYPERSHIFT_HOSTED_ADDONS: [AddonId; 4] = [
    AddonId::ApplicationManager,
    AddonId::CertPolicyController,
    AddonId::ConfigPolicyController,
    AddonId::GovernancePolicyFramework,
];

/// Resolves the addon set for a provisioning class.
///
/// Hypershift-hosted and claim-based sets are fixed; the standard set is
/// configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonResolver {
    standard: BTreeSet<AddonId>,
}

impl Default for AddonResolver {
    fn default() -> Self {
        Self::new(AddonId::ALL.into_iter().collect())
    }
}

impl AddonResolver {
    pub fn new(standard: BTreeSet<AddonId>) -> Self {
        Self { standard }
    }

    pub fn resolve(&self, class: ProvisioningClass) -> BTreeSet<AddonId> {
        match class {
            ProvisioningClass::HypershiftHosted => HYPERSHIFT_HOSTED_ADDONS.into_iter().collect(),
            ProvisioningClass::ClaimBased => AddonId::ALL.into_iter().collect(),
            ProvisioningClass::Standard => self.standard.clone(),
        }
    }
}

/// Parses a comma-separated addon list, e.g. from `STANDARD_ADDONS`.
pub fn parse_addon_list(value: &str) -> Result<BTreeSet<AddonId>, ControllerError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(AddonId::from_str)
        .collect()
}
