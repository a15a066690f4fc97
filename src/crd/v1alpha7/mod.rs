//! Previous API version, served for existing objects and converted to the hub

mod openstack_machine;

pub use openstack_machine::*;

/// API version string of this module's resources
pub const API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1alpha7";
