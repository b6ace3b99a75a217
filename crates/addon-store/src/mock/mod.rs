//! Mock store for unit testing
//!
//! In-memory implementation of all three store traits, so the controller can
//! be exercised end to end without an API server.
//!
//! The mock is organized into per-kind modules:
//! - `clusters.rs` - cluster registrations
//! - `configs.rs` - addon configurations (conditional writes, status)
//! - `addons.rs` - addon installations
//! - `helpers.rs` - builders for test objects
//!
//! Writes bump a store-wide resource version, emit watch events and can be
//! made to fail on demand with `fail_next`.

mod addons;
mod clusters;
mod configs;
pub mod helpers;

use crate::error::StoreError;
use crate::store_trait::{AddonConfigStore, AddonStore, ClusterStore, WatchEvent, WatchStream};
use crds::{KlusterletAddonConfig, ManagedCluster, ManagedClusterAddOn};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const WATCH_BUFFER: usize = 1024;

/// Store operations that can be counted and made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetCluster,
    ListClusters,
    GetConfig,
    CreateConfig,
    ReplaceConfig,
    ReplaceConfigStatus,
    DeleteConfig,
    GetAddon,
    ListAddons,
    CreateAddon,
    DeleteAddon,
}

/// An injected failure pending for an operation.
#[derive(Debug, Clone, Copy)]
struct Injected {
    remaining: u32,
    conflict: bool,
}

/// Mock store for testing
#[derive(Clone)]
pub struct MockStore {
    pub(crate) clusters: Arc<Mutex<HashMap<String, ManagedCluster>>>,
    pub(crate) configs: Arc<Mutex<HashMap<(String, String), KlusterletAddonConfig>>>,
    pub(crate) addons: Arc<Mutex<HashMap<(String, String), ManagedClusterAddOn>>>,
    pub(crate) cluster_events: broadcast::Sender<WatchEvent<ManagedCluster>>,
    pub(crate) config_events: broadcast::Sender<WatchEvent<KlusterletAddonConfig>>,
    pub(crate) addon_events: broadcast::Sender<WatchEvent<ManagedClusterAddOn>>,
    /// Pending injected failures per operation
    failures: Arc<Mutex<HashMap<Operation, Injected>>>,
    /// Number of calls per operation, including failed ones
    calls: Arc<Mutex<HashMap<Operation, u32>>>,
    // Counter for generating resource versions
    next_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("clusters", &self.clusters.lock().unwrap().len())
            .field("configs", &self.configs.lock().unwrap().len())
            .field("addons", &self.addons.lock().unwrap().len())
            .finish()
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        let (cluster_events, _) = broadcast::channel(WATCH_BUFFER);
        let (config_events, _) = broadcast::channel(WATCH_BUFFER);
        let (addon_events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            clusters: Arc::new(Mutex::new(HashMap::new())),
            configs: Arc::new(Mutex::new(HashMap::new())),
            addons: Arc::new(Mutex::new(HashMap::new())),
            cluster_events,
            config_events,
            addon_events,
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            next_version: Arc::new(Mutex::new(1)),
        }
    }

    /// Register a cluster (what the fleet-membership system would do)
    pub fn add_cluster(&self, mut cluster: ManagedCluster) {
        let name = cluster.metadata.name.clone().unwrap_or_default();
        cluster.metadata.resource_version = Some(self.next_version());
        self.clusters.lock().unwrap().insert(name, cluster.clone());
        let _ = self.cluster_events.send(WatchEvent::Applied(cluster));
    }

    /// Deregister a cluster. Downstream objects are left alone; cascade
    /// deletion is the API server's job, not the controller's.
    pub fn remove_cluster(&self, name: &str) {
        let removed = self.clusters.lock().unwrap().remove(name);
        if let Some(cluster) = removed {
            let _ = self.cluster_events.send(WatchEvent::Deleted(cluster));
        }
    }

    /// Insert an addon installation directly, bypassing failure injection
    pub fn add_addon(&self, addon: ManagedClusterAddOn) {
        addons::insert(self, addon);
    }

    /// Insert a configuration directly, bypassing failure injection
    pub fn add_config(&self, config: KlusterletAddonConfig) {
        configs::insert(self, config);
    }

    /// Current configuration, if any
    pub fn config(&self, namespace: &str, name: &str) -> Option<KlusterletAddonConfig> {
        self.configs
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Sorted names of the addon installations in a namespace
    pub fn addon_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .addons
            .lock()
            .unwrap()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Make the next `times` calls of `op` fail with a transient error
    pub fn fail_next(&self, op: Operation, times: u32) {
        self.failures.lock().unwrap().insert(
            op,
            Injected {
                remaining: times,
                conflict: false,
            },
        );
    }

    /// Make the next `times` calls of `op` fail with a resourceVersion
    /// conflict, as if another writer got there first
    pub fn conflict_next(&self, op: Operation, times: u32) {
        self.failures.lock().unwrap().insert(
            op,
            Injected {
                remaining: times,
                conflict: true,
            },
        );
    }

    /// Stop injecting failures for `op`
    pub fn clear_failures(&self, op: Operation) {
        self.failures.lock().unwrap().remove(&op);
    }

    /// Number of calls made to `op`, including failed ones
    pub fn call_count(&self, op: Operation) -> u32 {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Records a call and consumes an injected failure if one is pending.
    pub(crate) fn enter(&self, op: Operation) -> Result<(), StoreError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;

        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&op) {
            Some(injected) if injected.remaining > 0 => {
                injected.remaining -= 1;
                if injected.conflict {
                    Err(StoreError::Conflict(format!("injected conflict for {op:?}")))
                } else {
                    Err(StoreError::Transient(format!("injected failure for {op:?}")))
                }
            }
            _ => Ok(()),
        }
    }

    /// Generate the next resource version
    pub(crate) fn next_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        let current = *version;
        *version += 1;
        current.to_string()
    }
}

/// Subscribes before snapshotting so no event between the two is lost.
/// Objects may be reported twice, which watch consumers must tolerate anyway.
pub(crate) fn watch<K>(sender: &broadcast::Sender<WatchEvent<K>>, snapshot: impl FnOnce() -> Vec<K>) -> WatchStream<K>
where
    K: Clone + Send + 'static,
{
    let receiver = sender.subscribe();
    let initial = stream::iter(snapshot().into_iter().map(|obj| Ok(WatchEvent::Applied(obj))));
    let live = stream::unfold(receiver, |mut receiver| async move {
        match receiver.recv().await {
            Ok(event) => Some((Ok(event), receiver)),
            Err(RecvError::Lagged(skipped)) => {
                Some((Err(StoreError::Watch(format!("watch lagged by {skipped} events"))), receiver))
            }
            Err(RecvError::Closed) => None,
        }
    });
    initial.chain(live).boxed()
}

#[async_trait::async_trait]
impl ClusterStore for MockStore {
    async fn get_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, StoreError> {
        clusters::get_cluster(self, name).await
    }

    async fn list_clusters(&self) -> Result<Vec<ManagedCluster>, StoreError> {
        clusters::list_clusters(self).await
    }

    fn watch_clusters(&self) -> WatchStream<ManagedCluster> {
        let clusters = self.clusters.clone();
        watch(&self.cluster_events, move || clusters.lock().unwrap().values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl AddonConfigStore for MockStore {
    async fn get_config(&self, namespace: &str, name: &str) -> Result<Option<KlusterletAddonConfig>, StoreError> {
        configs::get_config(self, namespace, name).await
    }

    async fn create_config(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError> {
        configs::create_config(self, config).await
    }

    async fn replace_config(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError> {
        configs::replace_config(self, config).await
    }

    async fn replace_config_status(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError> {
        configs::replace_config_status(self, config).await
    }

    async fn delete_config(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        configs::delete_config(self, namespace, name).await
    }

    fn watch_configs(&self) -> WatchStream<KlusterletAddonConfig> {
        let configs = self.configs.clone();
        watch(&self.config_events, move || configs.lock().unwrap().values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl AddonStore for MockStore {
    async fn get_addon(&self, namespace: &str, name: &str) -> Result<Option<ManagedClusterAddOn>, StoreError> {
        addons::get_addon(self, namespace, name).await
    }

    async fn list_addons(&self, namespace: &str) -> Result<Vec<ManagedClusterAddOn>, StoreError> {
        addons::list_addons(self, namespace).await
    }

    async fn create_addon(&self, addon: &ManagedClusterAddOn) -> Result<ManagedClusterAddOn, StoreError> {
        addons::create_addon(self, addon).await
    }

    async fn delete_addon(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        addons::delete_addon(self, namespace, name).await
    }

    fn watch_addons(&self) -> WatchStream<ManagedClusterAddOn> {
        let addons = self.addons.clone();
        watch(&self.addon_events, move || addons.lock().unwrap().values().cloned().collect())
    }
}
