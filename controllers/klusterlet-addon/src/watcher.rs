//! Kubernetes resource watchers.
//!
//! One `kube_runtime::Controller` per process, keyed on `ManagedCluster`.
//! `KlusterletAddonConfig` and `ManagedClusterAddOn` changes map to their
//! cluster through the namespace, which is the cluster name. The scheduler
//! deduplicates requests and never runs two passes for one cluster at once.

use crate::config::Config;
use crate::controller::{error_policy, log_result, reconcile};
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{KlusterletAddonConfig, ManagedCluster, ManagedClusterAddOn};
use futures::stream::{self, Stream, StreamExt};
use kube::{Api, Client, Resource};
use kube_runtime::controller::Config as ControllerConfig;
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::{watcher, Controller};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Watches cluster registrations and the objects derived from them.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    cluster_api: Api<ManagedCluster>,
    config_api: Api<KlusterletAddonConfig>,
    addon_api: Api<ManagedClusterAddOn>,
}

impl Watcher {
    pub fn new(client: Client, reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            cluster_api: Api::all(client.clone()),
            config_api: Api::all(client.clone()),
            addon_api: Api::all(client),
        }
    }

    /// Runs the cluster controller until `shutdown` resolves.
    pub async fn watch_clusters<S>(
        &self,
        settings: &Config,
        ready: Arc<AtomicBool>,
        shutdown: S,
    ) -> Result<(), ControllerError>
    where
        S: Future<Output = ()> + Send + Sync + 'static,
    {
        info!("Starting ManagedCluster watcher");

        let controller = Controller::new(self.cluster_api.clone(), watcher::Config::default())
            .watches(
                self.config_api.clone(),
                watcher::Config::default(),
                cluster_for_namespace::<KlusterletAddonConfig>,
            )
            .watches(
                self.addon_api.clone(),
                watcher::Config::default(),
                cluster_for_namespace::<ManagedClusterAddOn>,
            )
            .with_config(ControllerConfig::default().concurrency(settings.worker_count));

        let clusters = controller.store();
        let readiness = tokio::spawn(mark_ready_when_synced(clusters.clone(), ready));

        controller
            .reconcile_all_on(sweep_ticks(settings.resync_interval, self.reconciler.clone(), clusters))
            .graceful_shutdown_on(shutdown)
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|result| async move { log_result(result) })
            .await;

        readiness.abort();
        info!("ManagedCluster watcher stopped");
        Ok(())
    }
}

/// Maps a namespaced object to the cluster named by its namespace.
pub fn cluster_for_namespace<K: Resource>(obj: K) -> Option<ObjectRef<ManagedCluster>> {
    obj.meta().namespace.as_deref().map(ObjectRef::new)
}

/// Ticks once per `period`, starting one period from now; the initial list
/// already covers startup. On every tick the reconciler forgets clusters
/// that are gone from the cache.
pub fn sweep_ticks(
    period: Duration,
    reconciler: Arc<Reconciler>,
    clusters: Store<ManagedCluster>,
) -> impl Stream<Item = ()> + Send + Sync + 'static {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold((ticker, reconciler, clusters), |(mut ticker, reconciler, clusters)| async move {
        ticker.tick().await;
        let pruned = reconciler.prune(|name| clusters.get(&ObjectRef::new(name)).is_some());
        debug!(clusters = clusters.state().len(), pruned, "Periodic sweep");
        Some(((), (ticker, reconciler, clusters)))
    })
}

/// Sets `ready` once the cluster cache holds the initial list.
pub async fn mark_ready_when_synced(clusters: Store<ManagedCluster>, ready: Arc<AtomicBool>) {
    if clusters.wait_until_ready().await.is_err() {
        warn!("ManagedCluster cache closed before its initial sync");
        return;
    }
    ready.store(true, Ordering::SeqCst);
    info!(clusters = clusters.state().len(), "Initial ManagedCluster sync complete, controller ready");
}
