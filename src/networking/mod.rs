//! Managed security groups
//!
//! - [`resolver`] turns symbolic group names into remote IDs
//! - [`desired`] computes the security groups a cluster should have
//! - [`groups`] and [`rules`] apply that state through a [`NetworkClient`]

mod client;
pub mod desired;
pub mod groups;
pub mod names;
pub mod resolver;
pub mod rules;
mod spec;

pub use client::*;
pub use desired::{build_desired_security_groups, managed_roles, BaselinePolicy, DefaultBaselinePolicy};
pub use groups::{delete_managed_security_group, delete_security_group, ensure_security_group};
pub use resolver::{
    resolve_all_nodes_rules, resolve_remote_managed_groups, validate_optional_groups_referenced,
    RemoteManagedGroups,
};
pub use rules::reconcile_group_rules;
pub use spec::{ResolvedSecurityGroupRuleSpec, SecurityGroupSpec};
