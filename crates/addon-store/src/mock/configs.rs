//! Addon configuration operations for the mock store
//!
//! Mirrors API server semantics: create refuses duplicates, replace and
//! status writes are conditional on the resource version, a spec replace
//! leaves status untouched and vice versa.

use super::{MockStore, Operation};
use crate::error::StoreError;
use crate::store_trait::WatchEvent;
use crds::KlusterletAddonConfig;

fn key(config: &KlusterletAddonConfig) -> Result<(String, String), StoreError> {
    let name = config
        .metadata
        .name
        .clone()
        .ok_or_else(|| StoreError::InvalidObject("KlusterletAddonConfig missing name".to_string()))?;
    let namespace = config
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("KlusterletAddonConfig {name} missing namespace")))?;
    Ok((namespace, name))
}

pub(crate) fn insert(store: &MockStore, mut config: KlusterletAddonConfig) -> KlusterletAddonConfig {
    let key = (
        config.metadata.namespace.clone().unwrap_or_default(),
        config.metadata.name.clone().unwrap_or_default(),
    );
    let version = store.next_version();
    if config.metadata.uid.is_none() {
        config.metadata.uid = Some(format!("{}-{}", key.1, version));
    }
    config.metadata.resource_version = Some(version);
    store.configs.lock().unwrap().insert(key, config.clone());
    let _ = store.config_events.send(WatchEvent::Applied(config.clone()));
    config
}

pub(crate) async fn get_config(
    store: &MockStore,
    namespace: &str,
    name: &str,
) -> Result<Option<KlusterletAddonConfig>, StoreError> {
    store.enter(Operation::GetConfig)?;
    Ok(store.config(namespace, name))
}

pub(crate) async fn create_config(
    store: &MockStore,
    config: &KlusterletAddonConfig,
) -> Result<KlusterletAddonConfig, StoreError> {
    store.enter(Operation::CreateConfig)?;
    let key = key(config)?;

    let created = {
        let mut configs = store.configs.lock().unwrap();
        if configs.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("KlusterletAddonConfig {}/{}", key.0, key.1)));
        }
        let version = store.next_version();
        let mut created = config.clone();
        created.metadata.uid = Some(format!("{}-{}", key.1, version));
        created.metadata.resource_version = Some(version);
        configs.insert(key, created.clone());
        created
    };

    let _ = store.config_events.send(WatchEvent::Applied(created.clone()));
    Ok(created)
}

/// Checks the caller's resource version against the stored object and hands
/// back the stored object for modification.
fn check_version(
    stored: Option<&KlusterletAddonConfig>,
    config: &KlusterletAddonConfig,
    key: &(String, String),
) -> Result<KlusterletAddonConfig, StoreError> {
    let stored = stored.ok_or_else(|| StoreError::NotFound(format!("KlusterletAddonConfig {}/{}", key.0, key.1)))?;
    let wanted = config.metadata.resource_version.as_deref().ok_or_else(|| {
        StoreError::InvalidObject(format!("KlusterletAddonConfig {}/{} write without resourceVersion", key.0, key.1))
    })?;
    if stored.metadata.resource_version.as_deref() != Some(wanted) {
        return Err(StoreError::Conflict(format!(
            "KlusterletAddonConfig {}/{}: resourceVersion {} is stale",
            key.0, key.1, wanted
        )));
    }
    Ok(stored.clone())
}

pub(crate) async fn replace_config(
    store: &MockStore,
    config: &KlusterletAddonConfig,
) -> Result<KlusterletAddonConfig, StoreError> {
    store.enter(Operation::ReplaceConfig)?;
    let key = key(config)?;

    let updated = {
        let mut configs = store.configs.lock().unwrap();
        let mut updated = check_version(configs.get(&key), config, &key)?;
        updated.spec = config.spec.clone();
        updated.metadata.labels = config.metadata.labels.clone();
        updated.metadata.annotations = config.metadata.annotations.clone();
        updated.metadata.resource_version = Some(store.next_version());
        configs.insert(key, updated.clone());
        updated
    };

    let _ = store.config_events.send(WatchEvent::Applied(updated.clone()));
    Ok(updated)
}

pub(crate) async fn replace_config_status(
    store: &MockStore,
    config: &KlusterletAddonConfig,
) -> Result<KlusterletAddonConfig, StoreError> {
    store.enter(Operation::ReplaceConfigStatus)?;
    let key = key(config)?;

    let updated = {
        let mut configs = store.configs.lock().unwrap();
        let mut updated = check_version(configs.get(&key), config, &key)?;
        updated.status = config.status.clone();
        updated.metadata.resource_version = Some(store.next_version());
        configs.insert(key, updated.clone());
        updated
    };

    let _ = store.config_events.send(WatchEvent::Applied(updated.clone()));
    Ok(updated)
}

pub(crate) async fn delete_config(store: &MockStore, namespace: &str, name: &str) -> Result<(), StoreError> {
    store.enter(Operation::DeleteConfig)?;
    let removed = store
        .configs
        .lock()
        .unwrap()
        .remove(&(namespace.to_string(), name.to_string()));
    if let Some(config) = removed {
        let _ = store.config_events.send(WatchEvent::Deleted(config));
    }
    Ok(())
}
