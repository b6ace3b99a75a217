//! Per-cluster reconciliation.
//!
//! A pass for one cluster:
//! 1. read the registration; gone or deleting ends management (`Terminated`)
//! 2. classify it and resolve its addon set
//! 3. make sure the configuration exists and matches (`configuration`)
//! 4. converge the addon installations by set difference (`addons`)
//! 5. record the outcome in the configuration status (`status`)
//!
//! Passes are idempotent, so running one again after a partial failure or a
//! duplicate event is always safe.

mod addons;
mod configuration;
mod status;
#[cfg(test)]
mod reconciler_test;

use crate::addons::AddonResolver;
use crate::backoff::ExponentialBackoff;
use crate::classifier::classify_cluster;
use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::synthesizer::synthesize;
use addon_store::{StoreError, Stores};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// First requeue delay for a failing cluster; doubles up to `requeue_max`.
const REQUEUE_INITIAL: Duration = Duration::from_secs(1);

/// Requeue delay while an object in the way is still finalizing its deletion.
const PENDING_DELETION_REQUEUE: Duration = Duration::from_secs(5);

/// Where a cluster stands in its lifecycle, as last seen by this controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Unobserved,
    ConfigurationPending,
    ConfigurationPresent,
    AddonsConverging,
    Converged,
    Terminated,
}

impl ClusterPhase {
    /// True if the configuration was known to exist in this phase.
    fn has_configuration(self) -> bool {
        matches!(
            self,
            ClusterPhase::ConfigurationPresent | ClusterPhase::AddonsConverging | ClusterPhase::Converged
        )
    }
}

/// How the cluster is scheduled after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged; wait for the next event or sweep
    Done,
    /// Work is pending, look again after the delay
    Requeue(Duration),
    /// The registration is gone, nothing more to do
    Terminated,
}

/// Consecutive failure tracking for a cluster
#[derive(Debug, Clone, Default)]
struct BackoffState {
    error_count: u32,
    stalled: bool,
}

impl BackoffState {
    fn increment_error(&mut self) -> u32 {
        self.error_count = self.error_count.saturating_add(1);
        self.error_count
    }
}

pub struct Reconciler {
    pub(crate) stores: Stores,
    resolver: AddonResolver,
    retry: RetryPolicy,
    stall_threshold: u32,
    requeue_max: Duration,
    install_namespace: String,
    /// Last known phase per cluster name
    phases: Mutex<HashMap<String, ClusterPhase>>,
    /// Error count tracking per cluster name
    backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("resolver", &self.resolver)
            .field("retry", &self.retry)
            .field("stall_threshold", &self.stall_threshold)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(stores: Stores, config: &Config) -> Self {
        Self {
            stores,
            resolver: AddonResolver::new(config.standard_addons.clone()),
            retry: RetryPolicy {
                max_attempts: config.max_retries,
                initial: config.retry_initial,
                max: config.retry_max,
            },
            stall_threshold: config.stall_threshold.max(1),
            requeue_max: config.requeue_max,
            install_namespace: config.addon_install_namespace.clone(),
            phases: Mutex::new(HashMap::new()),
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one pass for a cluster.
    ///
    /// Store failures that survive the per-operation retries are returned;
    /// the caller hands them to [`Reconciler::record_failure`].
    pub async fn reconcile(&self, cluster_name: &str) -> Result<ReconcileOutcome, ControllerError> {
        match self.reconcile_cluster(cluster_name).await {
            Err(ControllerError::Terminated(_)) => Ok(self.terminate(cluster_name)),
            other => other,
        }
    }

    async fn reconcile_cluster(&self, cluster_name: &str) -> Result<ReconcileOutcome, ControllerError> {
        let clusters = &self.stores.clusters;
        let cluster = self
            .retry(cluster_name, "get cluster", move || clusters.get_cluster(cluster_name))
            .await?;
        let cluster = match cluster {
            Some(cluster) if !cluster.is_deleting() => cluster,
            _ => return Ok(self.terminate(cluster_name)),
        };

        let class = classify_cluster(&cluster);
        let resolved = self.resolver.resolve(class);
        debug!(cluster = %cluster_name, class = %class, addons = resolved.len(), "Reconciling cluster");

        let desired = synthesize(cluster_name, class, &self.resolver);
        let Some(config) = self.ensure_configuration(cluster_name, &desired).await? else {
            return Ok(ReconcileOutcome::Requeue(PENDING_DELETION_REQUEUE));
        };

        self.set_phase(cluster_name, ClusterPhase::AddonsConverging);
        let installed = self.converge_addons(cluster_name, &config, &resolved).await?;
        if installed < resolved.len() {
            // an installation of the same name is still terminating
            debug!(
                cluster = %cluster_name,
                installed,
                resolved = resolved.len(),
                "Addon installations still settling"
            );
            return Ok(ReconcileOutcome::Requeue(PENDING_DELETION_REQUEUE));
        }
        self.set_phase(cluster_name, ClusterPhase::Converged);

        self.write_converged_status(cluster_name, class, &resolved, installed).await?;
        self.reset_error(cluster_name);

        Ok(ReconcileOutcome::Done)
    }

    /// Records a failed pass.
    ///
    /// After `stall_threshold` consecutive failures the configuration status
    /// carries `ConvergenceStalled=True` with the last error.
    pub async fn record_failure(&self, cluster_name: &str, err: &ControllerError) {
        let error_count = self.increment_error(cluster_name);
        error!(
            cluster = %cluster_name,
            consecutive_failures = error_count,
            "Reconciliation failed: {}",
            err
        );

        if error_count >= self.stall_threshold {
            match self.write_stalled_status(cluster_name, err).await {
                Ok(()) => self.mark_stalled(cluster_name),
                Err(e) => warn!(cluster = %cluster_name, "Failed to record stalled condition: {}", e),
            }
        }
    }

    /// How long to wait before retrying a failing cluster: 1s doubling per
    /// consecutive failure, capped at `requeue_max`.
    pub fn failure_backoff(&self, cluster_name: &str) -> Duration {
        ExponentialBackoff::calculate_for_error_count(self.error_count(cluster_name), REQUEUE_INITIAL, self.requeue_max)
    }

    /// Last known phase of a cluster.
    pub fn phase(&self, cluster_name: &str) -> ClusterPhase {
        self.phases
            .lock()
            .ok()
            .and_then(|phases| phases.get(cluster_name).copied())
            .unwrap_or(ClusterPhase::Unobserved)
    }

    /// Consecutive failed passes for a cluster.
    fn error_count(&self, cluster_name: &str) -> u32 {
        self.backoff_states
            .lock()
            .ok()
            .and_then(|states| states.get(cluster_name).map(|s| s.error_count))
            .unwrap_or(0)
    }

    /// Forgets clusters that reached `Terminated` or are no longer
    /// registered. Called from the periodic sweep so deleted clusters do not
    /// accumulate.
    pub fn prune<F>(&self, registered: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let pruned = match self.phases.lock() {
            Ok(mut phases) => {
                let before = phases.len();
                phases.retain(|name, phase| *phase != ClusterPhase::Terminated && registered(name));
                before - phases.len()
            }
            Err(_) => 0,
        };
        if let Ok(mut states) = self.backoff_states.lock() {
            states.retain(|name, _| registered(name));
            metrics::set_stalled_clusters(states.values().filter(|s| s.stalled).count());
        }
        pruned
    }

    /// Updates the phase and returns the previous one.
    fn set_phase(&self, cluster_name: &str, phase: ClusterPhase) -> ClusterPhase {
        let previous = match self.phases.lock() {
            Ok(mut phases) => phases.insert(cluster_name.to_string(), phase),
            Err(e) => {
                warn!("Failed to lock phases: {}", e);
                None
            }
        }
        .unwrap_or(ClusterPhase::Unobserved);

        if previous != phase {
            debug!(cluster = %cluster_name, from = ?previous, to = ?phase, "Phase transition");
        }
        previous
    }

    /// Stops managing a cluster whose registration is gone. Downstream
    /// objects are left to garbage collection.
    fn terminate(&self, cluster_name: &str) -> ReconcileOutcome {
        let previous = self.set_phase(cluster_name, ClusterPhase::Terminated);
        if previous != ClusterPhase::Terminated && previous != ClusterPhase::Unobserved {
            info!(cluster = %cluster_name, "Cluster registration gone, no longer managing it");
        }
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(cluster_name);
            metrics::set_stalled_clusters(states.values().filter(|s| s.stalled).count());
        }
        ReconcileOutcome::Terminated
    }

    fn increment_error(&self, cluster_name: &str) -> u32 {
        match self.backoff_states.lock() {
            Ok(mut states) => states.entry(cluster_name.to_string()).or_default().increment_error(),
            Err(e) => {
                warn!("Failed to lock backoff_states: {}", e);
                1
            }
        }
    }

    /// Clears the failure count after a successful pass.
    fn reset_error(&self, cluster_name: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.remove(cluster_name) {
                if state.stalled {
                    info!(
                        cluster = %cluster_name,
                        "Convergence recovered after {} failed passes",
                        state.error_count
                    );
                }
            }
            metrics::set_stalled_clusters(states.values().filter(|s| s.stalled).count());
        }
    }

    fn mark_stalled(&self, cluster_name: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(cluster_name) {
                state.stalled = true;
            }
            metrics::set_stalled_clusters(states.values().filter(|s| s.stalled).count());
        }
    }

    /// True while the registration exists and is not being deleted.
    async fn cluster_alive(&self, cluster_name: &str) -> Result<bool, StoreError> {
        let cluster = self.stores.clusters.get_cluster(cluster_name).await?;
        Ok(cluster.is_some_and(|c| !c.is_deleting()))
    }

    /// Retries a store operation for `cluster_name` with this reconciler's
    /// policy, aborting once the cluster is gone.
    async fn retry<T, Op, Fut>(&self, cluster_name: &str, what: &str, op: Op) -> Result<T, ControllerError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        retry_with_backoff(&self.retry, cluster_name, what, move || self.cluster_alive(cluster_name), op).await
    }
}
