//! Unit tests for the reconciler, driven directly against the mock store

#[cfg(test)]
mod tests {
    use super::super::{ClusterPhase, ReconcileOutcome};
    use crate::addons::AddonId;
    use crate::error::ControllerError;
    use crate::test_utils::*;
    use addon_store::mock::helpers::{addon, claim_cluster, cluster, hypershift_cluster};
    use addon_store::{AddonConfigStore, MockStore, Operation, StoreError, Stores, WatchStream};
    use crds::{
        ConditionStatus, KlusterletAddonConfig, CONDITION_CONVERGED, CONDITION_CONVERGENCE_STALLED, MANAGED_BY_LABEL,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use std::sync::Arc;
    use std::time::Duration;

    const HYPERSHIFT_ADDONS: [&str; 4] = [
        "application-manager",
        "cert-policy-controller",
        "config-policy-controller",
        "governance-policy-framework",
    ];

    fn all_addons() -> Vec<String> {
        vec![
            "application-manager".to_string(),
            "cert-policy-controller".to_string(),
            "config-policy-controller".to_string(),
            "governance-policy-framework".to_string(),
            "iam-policy-controller".to_string(),
            "search-collector".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_hypershift_cluster_gets_config_and_four_addons() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("cluster-test-ab12cd"));
        let reconciler = test_reconciler(&store);

        let outcome = reconciler.reconcile("cluster-test-ab12cd").await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Done);
        assert_eq!(reconciler.phase("cluster-test-ab12cd"), ClusterPhase::Converged);
        assert_eq!(store.addon_names("cluster-test-ab12cd"), HYPERSHIFT_ADDONS.to_vec());

        let config = store.config("cluster-test-ab12cd", "cluster-test-ab12cd").unwrap();
        assert_eq!(config.spec.cluster_name, "cluster-test-ab12cd");
        assert!(config.spec.policy_controller.enabled);
        assert!(!config.spec.search_collector.enabled);

        let status = config.status.unwrap();
        assert_eq!(status.provisioning_class.as_deref(), Some("hypershift-hosted"));
        assert_eq!(status.observed_addons, Some(4));
        assert!(status.last_reconciled.is_some());
        assert_eq!(status.condition(CONDITION_CONVERGED).unwrap().status, ConditionStatus::True);
        assert_eq!(
            status.condition(CONDITION_CONVERGENCE_STALLED).unwrap().status,
            ConditionStatus::False
        );
    }

    #[tokio::test]
    async fn test_claim_cluster_gets_six_addons() {
        let store = MockStore::new();
        store.add_cluster(claim_cluster("claimed"));
        let reconciler = test_reconciler(&store);

        reconciler.reconcile("claimed").await.unwrap();

        assert_eq!(store.addon_names("claimed"), all_addons());
        let status = store.config("claimed", "claimed").unwrap().status.unwrap();
        assert_eq!(status.provisioning_class.as_deref(), Some("claim-based"));
        assert_eq!(status.observed_addons, Some(6));
    }

    #[tokio::test]
    async fn test_standard_cluster_uses_configured_set() {
        let store = MockStore::new();
        store.add_cluster(cluster("plain", None));
        let mut config = test_config();
        config.standard_addons = [AddonId::SearchCollector].into_iter().collect();
        let reconciler = super::super::Reconciler::new(Stores::from_backend(store.clone()), &config);

        reconciler.reconcile("plain").await.unwrap();

        assert_eq!(store.addon_names("plain"), vec!["search-collector".to_string()]);
        let spec = store.config("plain", "plain").unwrap().spec;
        assert!(spec.search_collector.enabled);
        assert!(!spec.application_manager.enabled);
    }

    #[tokio::test]
    async fn test_created_addons_are_labelled_and_owned() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let reconciler = test_reconciler(&store);

        reconciler.reconcile("c1").await.unwrap();

        let config = store.config("c1", "c1").unwrap();
        let installation = addon_store::AddonStore::get_addon(&store, "c1", "application-manager")
            .await
            .unwrap()
            .unwrap();
        assert!(installation.metadata.labels.unwrap().contains_key(MANAGED_BY_LABEL));
        assert_eq!(
            installation.spec.install_namespace.as_deref(),
            Some(crds::DEFAULT_ADDON_INSTALL_NAMESPACE)
        );
        let owners = installation.metadata.owner_references.unwrap();
        assert_eq!(Some(owners[0].uid.clone()), config.metadata.uid);
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let reconciler = test_reconciler(&store);
        reconciler.reconcile("c1").await.unwrap();

        let status_writes = store.call_count(Operation::ReplaceConfigStatus);
        let version = store.config("c1", "c1").unwrap().metadata.resource_version;

        assert_eq!(reconciler.reconcile("c1").await.unwrap(), ReconcileOutcome::Done);

        assert_eq!(store.call_count(Operation::CreateConfig), 1);
        assert_eq!(store.call_count(Operation::CreateAddon), 4);
        assert_eq!(store.call_count(Operation::ReplaceConfig), 0);
        assert_eq!(store.call_count(Operation::ReplaceConfigStatus), status_writes);
        assert_eq!(store.config("c1", "c1").unwrap().metadata.resource_version, version);
    }

    #[tokio::test]
    async fn test_deleted_config_is_recreated() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let reconciler = test_reconciler(&store);
        reconciler.reconcile("c1").await.unwrap();
        let original_uid = store.config("c1", "c1").unwrap().metadata.uid;

        store.delete_config("c1", "c1").await.unwrap();
        assert!(store.config("c1", "c1").is_none());

        assert_eq!(reconciler.reconcile("c1").await.unwrap(), ReconcileOutcome::Done);

        let recreated = store.config("c1", "c1").unwrap();
        assert_eq!(recreated.metadata.name.as_deref(), Some("c1"));
        assert_eq!(recreated.metadata.namespace.as_deref(), Some("c1"));
        assert_ne!(recreated.metadata.uid, original_uid);
        assert_eq!(store.addon_names("c1"), HYPERSHIFT_ADDONS.to_vec());
    }

    #[tokio::test]
    async fn test_deleted_addon_is_recreated() {
        let store = MockStore::new();
        store.add_cluster(claim_cluster("c1"));
        let reconciler = test_reconciler(&store);
        reconciler.reconcile("c1").await.unwrap();

        addon_store::AddonStore::delete_addon(&store, "c1", "search-collector").await.unwrap();
        reconciler.reconcile("c1").await.unwrap();

        assert_eq!(store.addon_names("c1"), all_addons());
        assert_eq!(store.call_count(Operation::CreateAddon), 7);
    }

    #[tokio::test]
    async fn test_extra_addons_are_deleted() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        store.add_addon(addon("c1", "search-collector"));
        store.add_addon(addon("c1", "iam-policy-controller"));
        // other namespaces are not touched
        store.add_addon(addon("c2", "search-collector"));
        let reconciler = test_reconciler(&store);

        reconciler.reconcile("c1").await.unwrap();

        assert_eq!(store.addon_names("c1"), HYPERSHIFT_ADDONS.to_vec());
        assert_eq!(store.addon_names("c2"), vec!["search-collector".to_string()]);
    }

    #[tokio::test]
    async fn test_addon_being_deleted_is_left_alone() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let mut leaving = addon("c1", "search-collector");
        leaving.metadata.deletion_timestamp = Some(Time(Default::default()));
        store.add_addon(leaving);
        let reconciler = test_reconciler(&store);

        reconciler.reconcile("c1").await.unwrap();

        assert_eq!(store.call_count(Operation::DeleteAddon), 0);
        assert_eq!(store.config("c1", "c1").unwrap().status.unwrap().observed_addons, Some(4));
    }

    #[tokio::test]
    async fn test_config_drift_is_repaired() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let reconciler = test_reconciler(&store);
        reconciler.reconcile("c1").await.unwrap();

        let mut tampered = store.config("c1", "c1").unwrap();
        tampered.spec.search_collector.enabled = true;
        tampered.spec.application_manager.enabled = false;
        store.replace_config(&tampered).await.unwrap();

        reconciler.reconcile("c1").await.unwrap();

        let repaired = store.config("c1", "c1").unwrap();
        assert!(repaired.spec.application_manager.enabled);
        assert!(!repaired.spec.search_collector.enabled);
        assert_eq!(store.call_count(Operation::ReplaceConfig), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_within_a_pass() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        store.fail_next(Operation::CreateConfig, 1);
        store.fail_next(Operation::CreateAddon, 2);
        let reconciler = test_reconciler(&store);

        assert_eq!(reconciler.reconcile("c1").await.unwrap(), ReconcileOutcome::Done);
        assert_eq!(store.addon_names("c1"), HYPERSHIFT_ADDONS.to_vec());
        assert_eq!(reconciler.error_count("c1"), 0);
    }

    #[tokio::test]
    async fn test_persistent_failure_surfaces_stalled_condition() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        store.fail_next(Operation::CreateAddon, u32::MAX);
        let reconciler = test_reconciler(&store);

        // test_config() stalls after two failed passes
        for expected in 1..=2 {
            let err = reconciler.reconcile("c1").await.unwrap_err();
            assert!(matches!(err, ControllerError::Reconciliation(_)));
            reconciler.record_failure("c1", &err).await;
            assert_eq!(reconciler.error_count("c1"), expected);
            assert_eq!(reconciler.failure_backoff("c1"), Duration::from_millis(100));
        }

        let config = store.config("c1", "c1").unwrap();
        assert_eq!(config.condition(CONDITION_CONVERGENCE_STALLED).unwrap().status, ConditionStatus::True);
        assert_eq!(config.condition(CONDITION_CONVERGED).unwrap().status, ConditionStatus::False);

        // recovery clears the stall
        store.clear_failures(Operation::CreateAddon);
        assert_eq!(reconciler.reconcile("c1").await.unwrap(), ReconcileOutcome::Done);
        assert_eq!(reconciler.error_count("c1"), 0);
        assert_eq!(reconciler.failure_backoff("c1"), Duration::from_millis(100));
        let config = store.config("c1", "c1").unwrap();
        assert_eq!(config.condition(CONDITION_CONVERGENCE_STALLED).unwrap().status, ConditionStatus::False);
        assert_eq!(config.condition(CONDITION_CONVERGED).unwrap().status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn test_failed_deletes_do_not_block_creates() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        store.add_addon(addon("c1", "search-collector"));
        store.fail_next(Operation::DeleteAddon, u32::MAX);
        let reconciler = test_reconciler(&store);

        assert!(reconciler.reconcile("c1").await.is_err());
        // all four creates went through next to the stuck delete
        assert_eq!(store.addon_names("c1").len(), 5);

        store.clear_failures(Operation::DeleteAddon);
        reconciler.reconcile("c1").await.unwrap();
        assert_eq!(store.addon_names("c1"), HYPERSHIFT_ADDONS.to_vec());
    }

    #[tokio::test]
    async fn test_missing_cluster_terminates_without_writes() {
        let store = MockStore::new();
        let reconciler = test_reconciler(&store);

        assert_eq!(reconciler.reconcile("ghost").await.unwrap(), ReconcileOutcome::Terminated);
        assert_eq!(store.call_count(Operation::CreateConfig), 0);
        assert_eq!(reconciler.phase("ghost"), ClusterPhase::Terminated);
        assert_eq!(reconciler.prune(|_| true), 1);
        assert_eq!(reconciler.phase("ghost"), ClusterPhase::Unobserved);
    }

    #[tokio::test]
    async fn test_prune_drops_unregistered_clusters() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        store.add_cluster(hypershift_cluster("c2"));
        store.fail_next(Operation::ListAddons, u32::MAX);
        let reconciler = test_reconciler(&store);

        let err = reconciler.reconcile("c1").await.unwrap_err();
        reconciler.record_failure("c1", &err).await;
        store.clear_failures(Operation::ListAddons);
        reconciler.reconcile("c2").await.unwrap();

        assert_eq!(reconciler.prune(|name| name == "c2"), 1);
        assert_eq!(reconciler.phase("c1"), ClusterPhase::Unobserved);
        assert_eq!(reconciler.error_count("c1"), 0);
        assert_eq!(reconciler.phase("c2"), ClusterPhase::Converged);
    }

    #[tokio::test]
    async fn test_deleting_cluster_terminates() {
        let store = MockStore::new();
        let mut leaving = hypershift_cluster("c1");
        leaving.metadata.deletion_timestamp = Some(Time(Default::default()));
        store.add_cluster(leaving);
        let reconciler = test_reconciler(&store);

        assert_eq!(reconciler.reconcile("c1").await.unwrap(), ReconcileOutcome::Terminated);
        assert!(store.config("c1", "c1").is_none());
    }

    #[tokio::test]
    async fn test_cluster_removed_mid_retry_aborts_the_pass() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        store.fail_next(Operation::CreateConfig, u32::MAX);

        let mut config = test_config();
        config.max_retries = 50;
        config.retry_initial = Duration::from_millis(20);
        config.retry_max = Duration::from_millis(20);
        let reconciler = super::super::Reconciler::new(Stores::from_backend(store.clone()), &config);

        let pass = tokio::spawn(async move { reconciler.reconcile("c1").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.remove_cluster("c1");

        let outcome = tokio::time::timeout(Duration::from_secs(2), pass).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), ReconcileOutcome::Terminated);
        assert!(store.call_count(Operation::CreateConfig) < 50);
    }

    #[tokio::test]
    async fn test_config_being_deleted_is_waited_for() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let reconciler = test_reconciler(&store);
        reconciler.reconcile("c1").await.unwrap();

        let mut leaving = store.config("c1", "c1").unwrap();
        leaving.metadata.deletion_timestamp = Some(Time(Default::default()));
        store.add_config(leaving);

        assert_eq!(
            reconciler.reconcile("c1").await.unwrap(),
            ReconcileOutcome::Requeue(Duration::from_secs(5))
        );
        assert_eq!(reconciler.phase("c1"), ClusterPhase::ConfigurationPending);
        assert_eq!(store.call_count(Operation::CreateConfig), 1);
        assert_eq!(store.call_count(Operation::ReplaceConfig), 0);
    }

    #[tokio::test]
    async fn test_conflicting_repair_rereads_and_retries() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let reconciler = test_reconciler(&store);
        reconciler.reconcile("c1").await.unwrap();

        let mut tampered = store.config("c1", "c1").unwrap();
        tampered.spec.application_manager.enabled = false;
        store.replace_config(&tampered).await.unwrap();
        let reads = store.call_count(Operation::GetConfig);
        store.conflict_next(Operation::ReplaceConfig, 1);

        assert_eq!(reconciler.reconcile("c1").await.unwrap(), ReconcileOutcome::Done);

        assert!(store.config("c1", "c1").unwrap().spec.application_manager.enabled);
        // tamper, lost race, successful repair
        assert_eq!(store.call_count(Operation::ReplaceConfig), 3);
        // two repair attempts, then the status update
        assert_eq!(store.call_count(Operation::GetConfig), reads + 3);
        assert_eq!(reconciler.error_count("c1"), 0);
    }

    /// Config store where every create loses the race: the object lands, but
    /// the caller is told it already existed.
    struct RacingConfigs {
        inner: MockStore,
    }

    #[async_trait::async_trait]
    impl AddonConfigStore for RacingConfigs {
        async fn get_config(&self, namespace: &str, name: &str) -> Result<Option<KlusterletAddonConfig>, StoreError> {
            self.inner.get_config(namespace, name).await
        }

        async fn create_config(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError> {
            self.inner.create_config(config).await?;
            Err(StoreError::AlreadyExists("KlusterletAddonConfig created concurrently".to_string()))
        }

        async fn replace_config(&self, config: &KlusterletAddonConfig) -> Result<KlusterletAddonConfig, StoreError> {
            self.inner.replace_config(config).await
        }

        async fn replace_config_status(
            &self,
            config: &KlusterletAddonConfig,
        ) -> Result<KlusterletAddonConfig, StoreError> {
            self.inner.replace_config_status(config).await
        }

        async fn delete_config(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
            self.inner.delete_config(namespace, name).await
        }

        fn watch_configs(&self) -> WatchStream<KlusterletAddonConfig> {
            self.inner.watch_configs()
        }
    }

    #[tokio::test]
    async fn test_create_race_adopts_the_existing_config() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let stores = Stores {
            clusters: Arc::new(store.clone()),
            configs: Arc::new(RacingConfigs { inner: store.clone() }),
            addons: Arc::new(store.clone()),
        };
        let reconciler = super::super::Reconciler::new(stores, &test_config());

        assert_eq!(reconciler.reconcile("c1").await.unwrap(), ReconcileOutcome::Done);
        assert_eq!(store.call_count(Operation::CreateConfig), 1);
        assert_eq!(reconciler.phase("c1"), ClusterPhase::Converged);
        assert_eq!(store.addon_names("c1"), HYPERSHIFT_ADDONS.to_vec());
        let config = store.config("c1", "c1").unwrap();
        assert_eq!(config.condition(CONDITION_CONVERGED).unwrap().status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn test_terminating_installation_is_not_counted() {
        let store = MockStore::new();
        store.add_cluster(hypershift_cluster("c1"));
        let mut leaving = addon("c1", "application-manager");
        leaving.metadata.deletion_timestamp = Some(Time(Default::default()));
        store.add_addon(leaving);
        let reconciler = test_reconciler(&store);

        // the create collides with the terminating object and the re-list
        // still sees only three live installations
        assert_eq!(
            reconciler.reconcile("c1").await.unwrap(),
            ReconcileOutcome::Requeue(Duration::from_secs(5))
        );
        assert_eq!(reconciler.phase("c1"), ClusterPhase::AddonsConverging);
        assert_eq!(store.call_count(Operation::CreateAddon), 4);
        assert_eq!(store.call_count(Operation::ReplaceConfigStatus), 0);
    }
}
