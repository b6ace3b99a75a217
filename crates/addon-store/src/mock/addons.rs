//! Addon installation operations for the mock store

use super::{MockStore, Operation};
use crate::error::StoreError;
use crate::store_trait::WatchEvent;
use crds::ManagedClusterAddOn;

pub(crate) fn insert(store: &MockStore, mut addon: ManagedClusterAddOn) -> ManagedClusterAddOn {
    let key = (
        addon.metadata.namespace.clone().unwrap_or_default(),
        addon.metadata.name.clone().unwrap_or_default(),
    );
    addon.metadata.resource_version = Some(store.next_version());
    store.addons.lock().unwrap().insert(key, addon.clone());
    let _ = store.addon_events.send(WatchEvent::Applied(addon.clone()));
    addon
}

pub(crate) async fn get_addon(
    store: &MockStore,
    namespace: &str,
    name: &str,
) -> Result<Option<ManagedClusterAddOn>, StoreError> {
    store.enter(Operation::GetAddon)?;
    Ok(store
        .addons
        .lock()
        .unwrap()
        .get(&(namespace.to_string(), name.to_string()))
        .cloned())
}

pub(crate) async fn list_addons(store: &MockStore, namespace: &str) -> Result<Vec<ManagedClusterAddOn>, StoreError> {
    store.enter(Operation::ListAddons)?;
    let mut addons: Vec<ManagedClusterAddOn> = store
        .addons
        .lock()
        .unwrap()
        .iter()
        .filter(|((ns, _), _)| ns == namespace)
        .map(|(_, addon)| addon.clone())
        .collect();
    addons.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    Ok(addons)
}

pub(crate) async fn create_addon(
    store: &MockStore,
    addon: &ManagedClusterAddOn,
) -> Result<ManagedClusterAddOn, StoreError> {
    store.enter(Operation::CreateAddon)?;
    let name = addon
        .metadata
        .name
        .clone()
        .ok_or_else(|| StoreError::InvalidObject("ManagedClusterAddOn missing name".to_string()))?;
    let namespace = addon
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| StoreError::InvalidObject(format!("ManagedClusterAddOn {name} missing namespace")))?;

    if store.addons.lock().unwrap().contains_key(&(namespace.clone(), name.clone())) {
        return Err(StoreError::AlreadyExists(format!("ManagedClusterAddOn {namespace}/{name}")));
    }
    Ok(insert(store, addon.clone()))
}

pub(crate) async fn delete_addon(store: &MockStore, namespace: &str, name: &str) -> Result<(), StoreError> {
    store.enter(Operation::DeleteAddon)?;
    let removed = store
        .addons
        .lock()
        .unwrap()
        .remove(&(namespace.to_string(), name.to_string()));
    if let Some(addon) = removed {
        let _ = store.addon_events.send(WatchEvent::Deleted(addon));
    }
    Ok(())
}
