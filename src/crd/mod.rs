//! Custom Resource Definitions for the OpenStack cluster operator
//!
//! `v1beta1` is the hub (storage) version. `v1alpha7` is still served and is
//! converted through [`crate::conversion`].

pub mod v1alpha7;
pub mod v1beta1;

use kube::core::crd::merge_crds;
use kube::CustomResourceExt;

use crate::error::{Error, Result};

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>> {
    let machine = merge_crds(
        vec![v1alpha7::OpenStackMachine::crd(), v1beta1::OpenStackMachine::crd()],
        "v1beta1",
    )
    .map_err(|e| Error::Crd(format!("merging OpenStackMachine versions: {}", e)))?;

    [machine, v1beta1::OpenStackCluster::crd()]
        .iter()
        .map(|crd| serde_yaml::to_string(crd).map_err(|e| Error::Crd(e.to_string())))
        .collect()
}
