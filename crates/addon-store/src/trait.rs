//! Store traits for mocking
//!
//! One trait per object kind. The concrete `KubeStore` implements all three
//! against the Kubernetes API, tests use `MockStore`.

use crate::error::StoreError;
use crds::{KlusterletAddonConfig, ManagedCluster, ManagedClusterAddOn};
use futures::stream::BoxStream;
use std::sync::Arc;

/// Change notification delivered by a store watch.
///
/// Delivery is at-least-once and ordered per object. A fresh watch starts
/// with an `Applied` event for every object that already exists.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    /// Object was created or updated
    Applied(K),
    /// Object was deleted
    Deleted(K),
}

impl<K> WatchEvent<K> {
    /// The object carried by the event.
    pub fn object(&self) -> &K {
        match self {
            WatchEvent::Applied(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }
}

/// Long-running stream of watch events. Errors are reported in-band and the
/// stream keeps going.
pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, StoreError>>;

/// Read-only access to cluster registrations.
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, StoreError>;
    async fn list_clusters(&self) -> Result<Vec<ManagedCluster>, StoreError>;
    fn watch_clusters(&self) -> WatchStream<ManagedCluster>;
}

/// Access to per-cluster addon configurations.
#[async_trait::async_trait]
pub trait AddonConfigStore: Send + Sync {
    async fn get_config(&self, namespace: &str, name: &str) -> Result<Option<KlusterletAddonConfig>, StoreError>;

    /// Fails with `AlreadyExists` if an object with the same name exists.
    async fn create_config(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError>;

    /// Conditional replace of the spec. `metadata.resourceVersion` must be the
    /// observed version, otherwise the write fails with `Conflict`.
    async fn replace_config(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError>;

    /// Conditional replace of the status subresource.
    async fn replace_config_status(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError>;

    /// Deleting an object that does not exist succeeds.
    async fn delete_config(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    fn watch_configs(&self) -> WatchStream<KlusterletAddonConfig>;
}

/// Access to addon installations.
#[async_trait::async_trait]
pub trait AddonStore: Send + Sync {
    async fn get_addon(&self, namespace: &str, name: &str) -> Result<Option<ManagedClusterAddOn>, StoreError>;
    async fn list_addons(&self, namespace: &str) -> Result<Vec<ManagedClusterAddOn>, StoreError>;

    /// Fails with `AlreadyExists` if an object with the same name exists.
    async fn create_addon(&self, addon: &ManagedClusterAddOn) -> Result<ManagedClusterAddOn, StoreError>;

    /// Deleting an object that does not exist succeeds.
    async fn delete_addon(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    fn watch_addons(&self) -> WatchStream<ManagedClusterAddOn>;
}

/// Store handles passed explicitly to every component that needs them.
#[derive(Clone)]
pub struct Stores {
    pub clusters: Arc<dyn ClusterStore>,
    pub configs: Arc<dyn AddonConfigStore>,
    pub addons: Arc<dyn AddonStore>,
}

impl Stores {
    /// Builds the three handles from a single backend implementing every store.
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: ClusterStore + AddonConfigStore + AddonStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            clusters: backend.clone(),
            configs: backend.clone(),
            addons: backend,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
