//! Hub API version

mod openstack_cluster;
mod openstack_machine;
mod security_group;

pub use openstack_cluster::*;
pub use openstack_machine::*;
pub use security_group::*;

/// API version string of this module's resources
pub const API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta1";
