//! Controller configuration, read once from the environment at startup.

use crate::addons::{parse_addon_list, AddonId};
use crate::error::ControllerError;
use crds::DEFAULT_ADDON_INSTALL_NAMESPACE;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of clusters reconciled concurrently
    pub worker_count: u16,
    /// Interval between full sweeps over all registered clusters
    pub resync_interval: Duration,
    /// Attempts per store operation within one pass (first try included)
    pub max_retries: u32,
    pub retry_initial: Duration,
    pub retry_max: Duration,
    /// Consecutive failed passes before `ConvergenceStalled` is surfaced
    pub stall_threshold: u32,
    /// Upper bound for the requeue delay of a failing cluster
    pub requeue_max: Duration,
    /// Addon set for clusters without a recognized provisioner
    pub standard_addons: BTreeSet<AddonId>,
    pub addon_install_namespace: String,
    /// Listen address for probes and metrics
    pub metrics_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 4,
            resync_interval: Duration::from_secs(60),
            max_retries: 3,
            retry_initial: Duration::from_millis(200),
            retry_max: Duration::from_millis(5000),
            stall_threshold: 5,
            requeue_max: Duration::from_secs(300),
            standard_addons: AddonId::ALL.into_iter().collect(),
            addon_install_namespace: DEFAULT_ADDON_INSTALL_NAMESPACE.to_string(),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup; unset keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let worker_count: u16 = parse_or(&lookup, "WORKER_COUNT", defaults.worker_count)?;
        if worker_count == 0 {
            return Err(ControllerError::InvalidConfig("WORKER_COUNT must be at least 1".to_string()));
        }
        let max_retries: u32 = parse_or(&lookup, "MAX_RETRIES", defaults.max_retries)?;
        if max_retries == 0 {
            return Err(ControllerError::InvalidConfig("MAX_RETRIES must be at least 1".to_string()));
        }
        let resync_secs: u64 = parse_or(&lookup, "RESYNC_INTERVAL_SECS", 60)?;
        if resync_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "RESYNC_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }

        let standard_addons = match lookup("STANDARD_ADDONS") {
            Some(value) => parse_addon_list(&value)?,
            None => defaults.standard_addons,
        };

        let addon_install_namespace = lookup("ADDON_INSTALL_NAMESPACE")
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or(defaults.addon_install_namespace);

        Ok(Self {
            worker_count,
            resync_interval: Duration::from_secs(resync_secs),
            max_retries,
            retry_initial: Duration::from_millis(parse_or(&lookup, "RETRY_INITIAL_MILLIS", 200)?),
            retry_max: Duration::from_millis(parse_or(&lookup, "RETRY_MAX_MILLIS", 5000)?),
            stall_threshold: parse_or(&lookup, "STALL_THRESHOLD", defaults.stall_threshold)?,
            requeue_max: Duration::from_secs(parse_or(&lookup, "REQUEUE_MAX_SECS", 300)?),
            standard_addons,
            addon_install_namespace,
            metrics_addr: parse_or(&lookup, "METRICS_ADDR", defaults.metrics_addr)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
