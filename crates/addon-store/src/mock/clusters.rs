//! Cluster registration operations for the mock store

use super::{MockStore, Operation};
use crate::error::StoreError;
use crds::ManagedCluster;

pub(crate) async fn get_cluster(store: &MockStore, name: &str) -> Result<Option<ManagedCluster>, StoreError> {
    store.enter(Operation::GetCluster)?;
    Ok(store.clusters.lock().unwrap().get(name).cloned())
}

pub(crate) async fn list_clusters(store: &MockStore) -> Result<Vec<ManagedCluster>, StoreError> {
    store.enter(Operation::ListClusters)?;
    let mut clusters: Vec<ManagedCluster> = store.clusters.lock().unwrap().values().cloned().collect();
    clusters.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    Ok(clusters)
}
