//! Addon Object Stores
//!
//! Typed access to the three object stores the klusterlet addon controller
//! works through:
//! - cluster registrations (`ManagedCluster`), read-only
//! - addon configurations (`KlusterletAddonConfig`)
//! - addon installations (`ManagedClusterAddOn`)
//!
//! Each store is a trait so the controller can be driven by the Kubernetes
//! API in production and by an in-memory store in tests.
//!
//! # Example
//!
//! ```no_run
//! use addon_store::{KubeStore, Stores};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stores = Stores::from_backend(KubeStore::new(kube::Client::try_default().await?));
//!
//! for cluster in stores.clusters.list_clusters().await? {
//!     let name = cluster.metadata.name.clone().unwrap_or_default();
//!     let addons = stores.addons.list_addons(&name).await?;
//!     println!("{name}: {} addons", addons.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod kube_store;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use error::StoreError;
pub use kube_store::KubeStore;
pub use store_trait::{AddonConfigStore, AddonStore, ClusterStore, Stores, WatchEvent, WatchStream};
#[cfg(feature = "test-util")]
pub use mock::{MockStore, Operation};
