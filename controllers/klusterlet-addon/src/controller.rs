//! Main controller implementation.
//!
//! Scheduling is left to `kube_runtime`: the `Watcher` runs a
//! `kube_runtime::Controller` over `ManagedCluster` and hands every request
//! to [`reconcile`]. A failed pass is recorded on the reconciler, and
//! [`error_policy`] turns the failure count into the requeue delay.

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::watcher::Watcher;
use addon_store::{KubeStore, Stores};
use crds::ManagedCluster;
use kube::{Client, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Main controller for klusterlet addon management.
pub struct Controller {
    config: Config,
    watcher: Watcher,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(client: Client, config: Config) -> Self {
        info!("Initializing Klusterlet Addon Controller");
        let stores = Stores::from_backend(KubeStore::new(client.clone()));
        let reconciler = Arc::new(Reconciler::new(stores, &config));
        Self {
            watcher: Watcher::new(client, reconciler),
            config,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag flipped once the cluster cache holds the initial list.
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    /// Runs the controller until `shutdown` resolves. Passes already in
    /// flight finish before this returns. The scheduler stopping on its own
    /// is an error.
    pub async fn run<S>(self, shutdown: S) -> Result<(), ControllerError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let stop = Arc::new(Notify::new());
        let requested = Arc::new(AtomicBool::new(false));
        let signal = {
            let stop = stop.clone();
            let requested = requested.clone();
            tokio::spawn(async move {
                shutdown.await;
                info!("Shutdown requested, finishing in-flight reconciliations");
                requested.store(true, Ordering::SeqCst);
                stop.notify_one();
            })
        };

        info!(workers = self.config.worker_count, "Klusterlet Addon Controller running");
        let result = self
            .watcher
            .watch_clusters(&self.config, self.ready.clone(), async move { stop.notified().await })
            .await;

        signal.abort();
        self.ready.store(false, Ordering::SeqCst);

        match result {
            Ok(()) if requested.load(Ordering::SeqCst) => {
                info!("Klusterlet Addon Controller stopped");
                Ok(())
            }
            Ok(()) => {
                let err = ControllerError::Watch("ManagedCluster controller stopped unexpectedly".to_string());
                error!("{}", err);
                Err(err)
            }
            Err(e) => Err(e),
        }
    }
}

/// Runs one pass for the cluster behind a scheduler request.
pub async fn reconcile(cluster: Arc<ManagedCluster>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    let name = cluster.name_any();
    let started = Instant::now();

    match reconciler.reconcile(&name).await {
        Ok(ReconcileOutcome::Done) => {
            metrics::record_reconciliation("converged", started.elapsed());
            Ok(Action::await_change())
        }
        Ok(ReconcileOutcome::Requeue(after)) => {
            metrics::record_reconciliation("requeue", started.elapsed());
            Ok(Action::requeue(after))
        }
        Ok(ReconcileOutcome::Terminated) => {
            metrics::record_reconciliation("terminated", started.elapsed());
            Ok(Action::await_change())
        }
        Err(e) => {
            metrics::record_reconciliation("error", started.elapsed());
            reconciler.record_failure(&name, &e).await;
            Err(e)
        }
    }
}

/// Requeues a failed cluster after a delay that grows with its consecutive
/// failures.
pub fn error_policy(cluster: Arc<ManagedCluster>, _err: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let name = cluster.name_any();
    let after = reconciler.failure_backoff(&name);
    debug!(cluster = %name, "Requeueing in {:?}", after);
    Action::requeue(after)
}

/// Logs one item of the scheduler's output.
pub fn log_result<QueueErr>(
    result: Result<(ObjectRef<ManagedCluster>, Action), controller::Error<ControllerError, QueueErr>>,
) where
    QueueErr: std::error::Error + 'static,
{
    match result {
        Ok((cluster, action)) => debug!(cluster = %cluster.name, "Reconciled, next action {:?}", action),
        // record_failure already logged it
        Err(controller::Error::ReconcilerFailed(_, cluster)) => {
            debug!(cluster = %cluster.name, "Reconciliation failed")
        }
        Err(controller::Error::ObjectNotFound(cluster)) => {
            debug!(cluster = %cluster.name, "Cluster left the cache before its pass")
        }
        Err(e) => warn!("Controller error: {}", e),
    }
}
