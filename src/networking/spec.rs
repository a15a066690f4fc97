//! Desired-state types computed fresh on every pass

use crate::crd::v1beta1::{ManagedSecurityGroupName, SecurityGroupRuleSpec, SecurityGroupRuleStatus};

/// A security group rule with every symbolic reference resolved
///
/// Empty strings and zero ports mean "unset", as in the networking API.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedSecurityGroupRuleSpec {
    pub description: String,
    pub direction: String,
    pub ether_type: String,
    pub protocol: String,
    pub port_range_min: i32,
    pub port_range_max: i32,
    pub remote_group_id: String,
    pub remote_ip_prefix: String,
}

impl ResolvedSecurityGroupRuleSpec {
    /// Copy a user rule, pointing it at `remote_group_id`
    pub fn from_rule(rule: &SecurityGroupRuleSpec, remote_group_id: impl Into<String>) -> Self {
        Self {
            description: rule.description.clone().unwrap_or_default(),
            direction: rule.direction.clone(),
            ether_type: rule.ether_type.clone(),
            protocol: rule.protocol.clone().unwrap_or_default(),
            port_range_min: rule.port_range_min.unwrap_or_default(),
            port_range_max: rule.port_range_max.unwrap_or_default(),
            remote_group_id: remote_group_id.into(),
            remote_ip_prefix: rule.remote_ip_prefix.clone().unwrap_or_default(),
        }
    }

    /// Compare against an observed rule, ignoring the server-assigned ID
    pub fn matches(&self, observed: &SecurityGroupRuleStatus) -> bool {
        self.description == observed.description.as_deref().unwrap_or_default()
            && self.direction == observed.direction
            && self.ether_type == observed.ether_type.as_deref().unwrap_or_default()
            && self.protocol == observed.protocol.as_deref().unwrap_or_default()
            && self.port_range_min == observed.port_range_min.unwrap_or_default()
            && self.port_range_max == observed.port_range_max.unwrap_or_default()
            && self.remote_group_id == observed.remote_group_id.as_deref().unwrap_or_default()
            && self.remote_ip_prefix == observed.remote_ip_prefix.as_deref().unwrap_or_default()
    }

    /// Replace the `self` placeholder with the owning group's ID
    pub fn for_group(&self, group_id: &str) -> Self {
        let mut rule = self.clone();
        if rule.remote_group_id == ManagedSecurityGroupName::SELF {
            rule.remote_group_id = group_id.to_string();
        }
        rule
    }
}

/// Desired state of one security group
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityGroupSpec {
    pub name: String,
    /// Description used if the group has to be created
    pub description: String,
    pub rules: Vec<ResolvedSecurityGroupRuleSpec>,
}
