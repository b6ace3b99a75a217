//! CRD YAML Generator
//!
//! Prints the KlusterletAddonConfig CustomResourceDefinition as YAML so the
//! deployed CRD stays in sync with the Rust types.
//!
//! Usage:
//!   cargo run -p crds --bin crdgen > klusterletaddonconfig-crd.yaml

use crds::KlusterletAddonConfig;
use kube::CustomResourceExt;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let crd = KlusterletAddonConfig::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
