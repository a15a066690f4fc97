//! OpenStack cluster operator
//!
//! Reconciliation core of the cluster-api OpenStack infrastructure provider:
//! lossless conversion of OpenStackMachine between API versions, and managed
//! security groups for OpenStackCluster.

pub mod conversion;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod networking;
pub mod reconcilers;

pub use error::{Error, PartialStatus, Result};
