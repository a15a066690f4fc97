//! OpenStackCluster Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{SecurityGroupRuleSpec, SecurityGroupStatus};

/// OpenStackCluster resource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "OpenStackCluster",
    plural = "openstackclusters",
    singular = "openstackcluster",
    shortname = "osc",
    namespaced,
    status = "OpenStackClusterStatus",
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Ready", "type": "boolean", "jsonPath": ".status.ready"}"#,
    printcolumn = r#"{"name": "Control Plane SG", "type": "string", "jsonPath": ".status.controlPlaneSecurityGroup.id"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackClusterSpec {
    /// Managed security groups. When unset, security groups are managed
    /// externally and never touched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_security_groups: Option<ManagedSecurityGroups>,

    /// Bastion host configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion: Option<Bastion>,
}

impl OpenStackClusterSpec {
    /// Whether a bastion host (and therefore a bastion security group) is wanted
    pub fn bastion_enabled(&self) -> bool {
        self.bastion.as_ref().map(|b| b.enabled).unwrap_or(false)
    }
}

/// Managed security group configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedSecurityGroups {
    /// Rules applied to every node security group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_nodes_security_group_rules: Vec<SecurityGroupRuleSpec>,

    /// Allow all traffic between cluster nodes instead of the per-port defaults
    #[serde(default)]
    pub allow_all_in_cluster_traffic: bool,
}

/// Bastion host configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bastion {
    /// Enable the bastion host
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// OpenStackCluster status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackClusterStatus {
    /// Whether the cluster infrastructure is ready
    #[serde(default)]
    pub ready: bool,

    /// Control plane security group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_security_group: Option<SecurityGroupStatus>,

    /// Worker security group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_security_group: Option<SecurityGroupStatus>,

    /// Bastion security group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion_security_group: Option<SecurityGroupStatus>,

    /// Terminal failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}
