//! Networking API seam
//!
//! The operator never talks to the cloud directly; the embedding binary
//! supplies a [`NetworkClient`] that owns transport, authentication and
//! retries.

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::crd::v1beta1::{SecurityGroupRuleStatus, SecurityGroupStatus};
use crate::error::Result;

/// Security group as returned by the networking API
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rules: Vec<SecurityGroupRule>,
}

/// Security group rule as returned by the networking API
///
/// Unset string fields are empty and unset ports are zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecurityGroupRule {
    pub id: String,
    pub security_group_id: String,
    pub description: String,
    pub direction: String,
    pub ether_type: String,
    pub protocol: String,
    pub port_range_min: i32,
    pub port_range_max: i32,
    pub remote_group_id: String,
    pub remote_ip_prefix: String,
}

/// Parameters of a rule create call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateSecurityGroupRuleOpts {
    pub security_group_id: String,
    pub description: String,
    pub direction: String,
    pub ether_type: String,
    pub protocol: String,
    pub port_range_min: i32,
    pub port_range_max: i32,
    pub remote_group_id: String,
    pub remote_ip_prefix: String,
}

impl From<&SecurityGroupRule> for SecurityGroupRuleStatus {
    fn from(rule: &SecurityGroupRule) -> Self {
        Self {
            id: rule.id.clone(),
            description: Some(rule.description.clone()),
            direction: rule.direction.clone(),
            ether_type: Some(rule.ether_type.clone()),
            protocol: Some(rule.protocol.clone()),
            port_range_min: Some(rule.port_range_min),
            port_range_max: Some(rule.port_range_max),
            remote_group_id: Some(rule.remote_group_id.clone()),
            remote_ip_prefix: Some(rule.remote_ip_prefix.clone()),
        }
    }
}

impl From<&SecurityGroup> for SecurityGroupStatus {
    fn from(group: &SecurityGroup) -> Self {
        Self {
            id: group.id.clone(),
            name: group.name.clone(),
            rules: group.rules.iter().map(SecurityGroupRuleStatus::from).collect(),
        }
    }
}

/// Security group operations of the cloud networking API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// List security groups with exactly this name
    async fn list_security_groups(&self, name: &str) -> Result<Vec<SecurityGroup>>;

    /// Create a security group. The cloud may add default rules to it.
    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup>;

    /// Delete a security group. Returns [`crate::Error::NotFound`] if it is gone.
    async fn delete_security_group(&self, id: &str) -> Result<()>;

    /// Create a rule and return it with its server-assigned ID
    async fn create_security_group_rule(
        &self,
        opts: &CreateSecurityGroupRuleOpts,
    ) -> Result<SecurityGroupRule>;

    /// Delete a rule by ID
    async fn delete_security_group_rule(&self, id: &str) -> Result<()>;
}
