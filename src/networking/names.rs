//! Names and descriptions of cloud resources owned by a cluster

use crate::crd::v1beta1::ManagedSecurityGroupName;

/// Name of the security group backing `role` in `cluster_name`
pub fn security_group_name(cluster_name: &str, role: &ManagedSecurityGroupName) -> String {
    format!("k8s-cluster-{}-secgroup-{}", cluster_name, role)
}

/// Description stamped on resources created for `cluster_name`
pub fn description(cluster_name: &str) -> String {
    format!("Created by openstack-cluster-operator cluster {}", cluster_name)
}
