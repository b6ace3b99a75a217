//! Test utilities for reconciler and controller tests
//!
//! Fast timings so retry and requeue paths run in milliseconds.

#[cfg(test)]
use crate::config::Config;
#[cfg(test)]
use crate::controller::{error_policy, log_result, reconcile};
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use crate::watcher::{cluster_for_namespace, mark_ready_when_synced, sweep_ticks};
#[cfg(test)]
use addon_store::{AddonConfigStore, AddonStore, ClusterStore, MockStore, StoreError, Stores, WatchEvent};
#[cfg(test)]
use crds::ManagedCluster;
#[cfg(test)]
use futures::future;
#[cfg(test)]
use futures::stream::{self, BoxStream, StreamExt};
#[cfg(test)]
use kube_runtime::controller::{applier, Config as ControllerConfig};
#[cfg(test)]
use kube_runtime::reflector::{self, store::Writer, ObjectRef, Store};
#[cfg(test)]
use kube_runtime::watcher;
#[cfg(test)]
use std::sync::atomic::AtomicBool;
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use tokio::task::JoinHandle;

/// Configuration with millisecond retries and a short sweep interval
#[cfg(test)]
pub fn test_config() -> Config {
    Config {
        worker_count: 2,
        resync_interval: Duration::from_millis(200),
        max_retries: 3,
        retry_initial: Duration::from_millis(5),
        retry_max: Duration::from_millis(20),
        stall_threshold: 2,
        requeue_max: Duration::from_millis(100),
        ..Config::default()
    }
}

/// Reconciler over a mock store
#[cfg(test)]
pub fn test_reconciler(store: &MockStore) -> Reconciler {
    Reconciler::new(Stores::from_backend(store.clone()), &test_config())
}

/// Polls `condition` every 10ms until it holds or `timeout` passes.
#[cfg(test)]
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
type Requests = BoxStream<'static, Result<ObjectRef<ManagedCluster>, StoreError>>;

/// Runs `reconcile` and `error_policy` under the `kube_runtime` scheduler
/// against a mock store. The cluster cache and the request stream are fed
/// from the store's watches, the way `Controller` feeds them from the API
/// server. Abort the handle to stop.
#[cfg(test)]
pub fn spawn_controller(
    store: &MockStore,
    config: &Config,
    ready: Arc<AtomicBool>,
) -> (Arc<Reconciler>, JoinHandle<()>) {
    let reconciler = Arc::new(Reconciler::new(Stores::from_backend(store.clone()), config));
    let (clusters, writer) = reflector::store::<ManagedCluster>();
    tokio::spawn(mark_ready_when_synced(clusters.clone(), ready));

    let store = store.clone();
    let config = config.clone();
    let context = reconciler.clone();
    let handle = tokio::spawn(async move {
        let requests = cluster_requests(&store, writer, &config, context.clone(), clusters.clone()).await;
        applier(
            |cluster, ctx| Box::pin(reconcile(cluster, ctx)),
            error_policy,
            context,
            clusters,
            requests,
            ControllerConfig::default().concurrency(config.worker_count),
        )
        .for_each(|result| async move { log_result(result) })
        .await;
    });

    (reconciler, handle)
}

#[cfg(test)]
async fn cluster_requests(
    store: &MockStore,
    mut writer: Writer<ManagedCluster>,
    config: &Config,
    reconciler: Arc<Reconciler>,
    clusters: Store<ManagedCluster>,
) -> Requests {
    writer.apply_watcher_event(&watcher::Event::Init);
    for cluster in store.list_clusters().await.unwrap_or_default() {
        writer.apply_watcher_event(&watcher::Event::InitApply(cluster));
    }
    writer.apply_watcher_event(&watcher::Event::InitDone);

    let cluster_events = store.watch_clusters().filter_map(move |event| {
        let request = match event {
            Ok(WatchEvent::Applied(cluster)) => {
                let request = ObjectRef::from_obj(&cluster);
                writer.apply_watcher_event(&watcher::Event::Apply(cluster));
                Some(Ok(request))
            }
            Ok(WatchEvent::Deleted(cluster)) => {
                writer.apply_watcher_event(&watcher::Event::Delete(cluster));
                None
            }
            Err(e) => Some(Err(e)),
        };
        future::ready(request)
    });
    let config_events = store
        .watch_configs()
        .filter_map(|event| future::ready(event.map(|e| cluster_for_namespace(e.object().clone())).transpose()));
    let addon_events = store
        .watch_addons()
        .filter_map(|event| future::ready(event.map(|e| cluster_for_namespace(e.object().clone())).transpose()));
    let sweeps = sweep_ticks(config.resync_interval, reconciler, clusters.clone()).flat_map(move |()| {
        stream::iter(
            clusters
                .state()
                .into_iter()
                .map(|cluster| Ok::<_, StoreError>(ObjectRef::from_obj(&*cluster))),
        )
    });

    stream::select_all([cluster_events.boxed(), config_events.boxed(), addon_events.boxed(), sweeps.boxed()]).boxed()
}
