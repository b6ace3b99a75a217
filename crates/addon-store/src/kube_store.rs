//! Kubernetes-backed store implementation
//!
//! All three stores are served from a single `kube::Client`. Watches use
//! `kube_runtime::watcher` with the default backoff so a dropped connection
//! is re-established instead of ending the stream.

use crate::error::StoreError;
use crate::store_trait::{AddonConfigStore, AddonStore, ClusterStore, WatchEvent, WatchStream};
use crds::{KlusterletAddonConfig, ManagedCluster, ManagedClusterAddOn};
use futures::StreamExt;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn clusters_api(&self) -> Api<ManagedCluster> {
        Api::all(self.client.clone())
    }

    fn configs_api(&self, namespace: &str) -> Api<KlusterletAddonConfig> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn addons_api(&self, namespace: &str) -> Api<ManagedClusterAddOn> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Name and namespace of a namespaced object, required for writes.
fn object_key<K: Resource>(obj: &K, kind: &str) -> Result<(String, String), StoreError> {
    let meta = obj.meta();
    let name = meta
        .name
        .clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("{kind} missing name")))?;
    let namespace = meta
        .namespace
        .clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("{kind} {name} missing namespace")))?;
    Ok((namespace, name))
}

/// Wraps a `kube_runtime` watcher into a `WatchStream`.
///
/// `Init`/`InitDone` markers are dropped; objects listed during the initial
/// sync are reported as `Applied`.
fn watch_stream<K>(api: Api<K>) -> WatchStream<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    watcher(api, watcher::Config::default())
        .default_backoff()
        .filter_map(|event| async move {
            match event {
                Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                    Some(Ok(WatchEvent::Applied(obj)))
                }
                Ok(watcher::Event::Delete(obj)) => Some(Ok(WatchEvent::Deleted(obj))),
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                Err(e) => Some(Err(StoreError::Watch(e.to_string()))),
            }
        })
        .boxed()
}

#[async_trait::async_trait]
impl ClusterStore for KubeStore {
    async fn get_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, StoreError> {
        self.clusters_api()
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("ManagedCluster {name}")))
    }

    async fn list_clusters(&self) -> Result<Vec<ManagedCluster>, StoreError> {
        let list = self
            .clusters_api()
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube(e, "ManagedCluster list"))?;
        Ok(list.items)
    }

    fn watch_clusters(&self) -> WatchStream<ManagedCluster> {
        watch_stream(self.clusters_api())
    }
}

#[async_trait::async_trait]
impl AddonConfigStore for KubeStore {
    async fn get_config(&self, namespace: &str, name: &str) -> Result<Option<KlusterletAddonConfig>, StoreError> {
        self.configs_api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("KlusterletAddonConfig {namespace}/{name}")))
    }

    async fn create_config(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError> {
        let (namespace, name) = object_key(config, "KlusterletAddonConfig")?;
        debug!("Creating KlusterletAddonConfig {}/{}", namespace, name);
        self.configs_api(&namespace)
            .create(&PostParams::default(), config)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("KlusterletAddonConfig {namespace}/{name}")))
    }

    async fn replace_config(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError> {
        let (namespace, name) = object_key(config, "KlusterletAddonConfig")?;
        if config.metadata.resource_version.is_none() {
            return Err(StoreError::InvalidObject(format!(
                "KlusterletAddonConfig {namespace}/{name} replace without resourceVersion"
            )));
        }
        self.configs_api(&namespace)
            .replace(&name, &PostParams::default(), config)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("KlusterletAddonConfig {namespace}/{name}")))
    }

    async fn replace_config_status(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError> {
        let (namespace, name) = object_key(config, "KlusterletAddonConfig")?;
        let resource_version = config.metadata.resource_version.clone().ok_or_else(|| {
            StoreError::InvalidObject(format!(
                "KlusterletAddonConfig {namespace}/{name} status update without resourceVersion"
            ))
        })?;

        // A resourceVersion in the patch body makes the API server reject
        // the write with 409 if the object moved on.
        let status_patch = serde_json::json!({
            "metadata": { "resourceVersion": resource_version },
            "status": config.status,
        });

        self.configs_api(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("KlusterletAddonConfig {namespace}/{name} status")))
    }

    async fn delete_config(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self.configs_api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => match StoreError::from_kube(e, &format!("KlusterletAddonConfig {namespace}/{name}")) {
                StoreError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    fn watch_configs(&self) -> WatchStream<KlusterletAddonConfig> {
        watch_stream(Api::all(self.client.clone()))
    }
}

#[async_trait::async_trait]
impl AddonStore for KubeStore {
    async fn get_addon(&self, namespace: &str, name: &str) -> Result<Option<ManagedClusterAddOn>, StoreError> {
        self.addons_api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("ManagedClusterAddOn {namespace}/{name}")))
    }

    async fn list_addons(&self, namespace: &str) -> Result<Vec<ManagedClusterAddOn>, StoreError> {
        let list = self
            .addons_api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("ManagedClusterAddOn list {namespace}")))?;
        Ok(list.items)
    }

    async fn create_addon(&self, addon: &ManagedClusterAddOn) -> Result<ManagedClusterAddOn, StoreError> {
        let (namespace, name) = object_key(addon, "ManagedClusterAddOn")?;
        debug!("Creating ManagedClusterAddOn {}/{}", namespace, name);
        self.addons_api(&namespace)
            .create(&PostParams::default(), addon)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("ManagedClusterAddOn {namespace}/{name}")))
    }

    async fn delete_addon(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self.addons_api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => match StoreError::from_kube(e, &format!("ManagedClusterAddOn {namespace}/{name}")) {
                StoreError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }

    fn watch_addons(&self) -> WatchStream<ManagedClusterAddOn> {
        watch_stream(Api::all(self.client.clone()))
    }
}
