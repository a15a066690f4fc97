//! Security group types shared by the v1beta1 cluster resource

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Symbolic role name of a managed security group
///
/// Resolved to a remote group ID at reconciliation time.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct ManagedSecurityGroupName(String);

impl ManagedSecurityGroupName {
    /// The group a rule is attached to
    pub const SELF: &'static str = "self";
    /// Control plane nodes
    pub const CONTROL_PLANE: &'static str = "controlplane";
    /// Worker nodes
    pub const WORKER: &'static str = "worker";
    /// Bastion host, only present when the bastion is enabled
    pub const BASTION: &'static str = "bastion";

    /// Roles that may be absent from a cluster and must be wired when present
    pub const OPTIONAL: &'static [&'static str] = &[Self::BASTION];

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn control_plane() -> Self {
        Self::new(Self::CONTROL_PLANE)
    }

    pub fn worker() -> Self {
        Self::new(Self::WORKER)
    }

    pub fn bastion() -> Self {
        Self::new(Self::BASTION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManagedSecurityGroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ManagedSecurityGroupName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// User-authored security group rule
///
/// The remote selector is either `remoteManagedGroups` or `remoteIPPrefix`,
/// never both.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRuleSpec {
    /// Rule name, used only for error messages
    #[serde(default)]
    pub name: String,

    /// Rule description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Traffic direction (ingress, egress)
    #[serde(default = "default_direction")]
    pub direction: String,

    /// Ether type (IPv4, IPv6)
    #[serde(default = "default_ether_type")]
    pub ether_type: String,

    /// IP protocol (tcp, udp, icmp, ...). Unset matches any protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Lower bound of the port range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<i32>,

    /// Upper bound of the port range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<i32>,

    /// Remote CIDR
    #[serde(rename = "remoteIPPrefix", default, skip_serializing_if = "Option::is_none")]
    pub remote_ip_prefix: Option<String>,

    /// Managed groups the rule applies to, one concrete rule per group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_managed_groups: Vec<ManagedSecurityGroupName>,
}

impl Default for SecurityGroupRuleSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            direction: default_direction(),
            ether_type: default_ether_type(),
            protocol: None,
            port_range_min: None,
            port_range_max: None,
            remote_ip_prefix: None,
            remote_managed_groups: Vec::new(),
        }
    }
}

fn default_direction() -> String {
    "ingress".to_string()
}

fn default_ether_type() -> String {
    "IPv4".to_string()
}

/// Observed state of a security group in the cloud
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupStatus {
    /// Server-assigned group ID
    #[serde(default)]
    pub id: String,

    /// Group name
    #[serde(default)]
    pub name: String,

    /// Rules as last observed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SecurityGroupRuleStatus>,
}

/// Observed security group rule
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRuleStatus {
    /// Server-assigned rule ID
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub direction: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ether_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<i32>,

    #[serde(rename = "remoteGroupID", default, skip_serializing_if = "Option::is_none")]
    pub remote_group_id: Option<String>,

    #[serde(rename = "remoteIPPrefix", default, skip_serializing_if = "Option::is_none")]
    pub remote_ip_prefix: Option<String>,
}
