//! Resolution of symbolic managed group names to remote group IDs

use std::collections::BTreeMap;

use crate::crd::v1beta1::{ManagedSecurityGroupName, SecurityGroupRuleSpec};
use crate::error::{Error, Result};

use super::ResolvedSecurityGroupRuleSpec;

/// Role name to remote group ID, for the groups that exist in this pass.
/// The `self` entry maps to the placeholder itself.
pub type RemoteManagedGroups = BTreeMap<String, String>;

/// Map each requested role name to its remote ID
///
/// Output follows request order and keeps duplicates.
pub fn resolve_remote_managed_groups(
    known: &RemoteManagedGroups,
    requested: &[ManagedSecurityGroupName],
) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Err(Error::validation(
            "remoteManagedGroups: at least one remote managed group is required",
        ));
    }

    requested
        .iter()
        .map(|name| {
            known.get(name.as_str()).cloned().ok_or_else(|| {
                Error::validation(format!(
                    "remoteManagedGroups: '{}' is not a valid remote managed security group",
                    name
                ))
            })
        })
        .collect()
}

/// Every optional role present in `known` must be referenced by at least
/// one rule, otherwise that group would be unreachable from the nodes.
pub fn validate_optional_groups_referenced(
    known: &RemoteManagedGroups,
    rules: &[SecurityGroupRuleSpec],
) -> Result<()> {
    for optional in ManagedSecurityGroupName::OPTIONAL {
        if !known.contains_key(*optional) {
            continue;
        }
        let referenced = rules.iter().any(|rule| {
            rule.remote_managed_groups
                .iter()
                .any(|group| group.as_str() == *optional)
        });
        if !referenced {
            return Err(Error::validation(format!(
                "managed security group '{}' exists but no allNodesSecurityGroupRules entry references it",
                optional
            )));
        }
    }
    Ok(())
}

/// Expand the all-nodes rules into concrete rules
///
/// A rule naming N managed groups becomes N rules, one per remote group ID.
/// A rule with a remote CIDR passes through unchanged.
pub fn resolve_all_nodes_rules(
    known: &RemoteManagedGroups,
    rules: &[SecurityGroupRuleSpec],
) -> Result<Vec<ResolvedSecurityGroupRuleSpec>> {
    if rules.is_empty() {
        return Ok(Vec::new());
    }

    validate_optional_groups_referenced(known, rules)?;

    let mut resolved = Vec::new();
    for rule in rules {
        validate_remote_selector(rule)?;

        if rule.remote_managed_groups.is_empty() {
            resolved.push(ResolvedSecurityGroupRuleSpec::from_rule(rule, String::new()));
            continue;
        }

        for remote_group_id in resolve_remote_managed_groups(known, &rule.remote_managed_groups)? {
            resolved.push(ResolvedSecurityGroupRuleSpec::from_rule(rule, remote_group_id));
        }
    }
    Ok(resolved)
}

fn validate_remote_selector(rule: &SecurityGroupRuleSpec) -> Result<()> {
    let has_groups = !rule.remote_managed_groups.is_empty();
    let has_prefix = rule
        .remote_ip_prefix
        .as_deref()
        .map(|prefix| !prefix.is_empty())
        .unwrap_or(false);

    match (has_groups, has_prefix) {
        (true, false) | (false, true) => Ok(()),
        (true, true) => Err(Error::validation(format!(
            "rule '{}': remoteManagedGroups and remoteIPPrefix are mutually exclusive",
            rule.name
        ))),
        (false, false) => Err(Error::validation(format!(
            "rule '{}': one of remoteManagedGroups or remoteIPPrefix is required",
            rule.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(names: &[&str]) -> RemoteManagedGroups {
        names
            .iter()
            .map(|name| {
                let id = if *name == ManagedSecurityGroupName::SELF {
                    name.to_string()
                } else {
                    format!("{}-id", name)
                };
                (name.to_string(), id)
            })
            .collect()
    }

    fn names(names: &[&str]) -> Vec<ManagedSecurityGroupName> {
        names.iter().map(|n| ManagedSecurityGroupName::from(*n)).collect()
    }

    #[test]
    fn test_resolve_follows_request_order() {
        let known = known(&["self", "controlplane", "worker", "bastion"]);

        let ids = resolve_remote_managed_groups(&known, &names(&["worker", "self", "controlplane"]))
            .unwrap();

        assert_eq!(ids, vec!["worker-id", "self", "controlplane-id"]);
    }

    #[test]
    fn test_resolve_keeps_duplicates() {
        let known = known(&["self", "controlplane", "worker"]);

        let ids = resolve_remote_managed_groups(&known, &names(&["worker", "worker"])).unwrap();

        assert_eq!(ids, vec!["worker-id", "worker-id"]);
    }

    #[test]
    fn test_resolve_empty_request_fails() {
        let known = known(&["self", "controlplane", "worker"]);

        let err = resolve_remote_managed_groups(&known, &[]).unwrap_err();

        assert!(err.is_validation());
    }

    #[test]
    fn test_resolve_unknown_name_fails() {
        let known = known(&["self", "controlplane", "worker"]);

        let err = resolve_remote_managed_groups(&known, &names(&["bastion"])).unwrap_err();

        assert!(err.is_validation());
        assert!(err.to_string().contains("bastion"));
    }

    #[test]
    fn test_unwired_bastion_fails() {
        let known = known(&["self", "controlplane", "worker", "bastion"]);
        let rules = vec![SecurityGroupRuleSpec {
            name: "ssh".to_string(),
            remote_managed_groups: names(&["controlplane", "worker"]),
            ..Default::default()
        }];

        let err = validate_optional_groups_referenced(&known, &rules).unwrap_err();

        assert!(err.to_string().contains("bastion"));
    }

    #[test]
    fn test_absent_bastion_needs_no_wiring() {
        let known = known(&["self", "controlplane", "worker"]);

        assert!(validate_optional_groups_referenced(&known, &[]).is_ok());
    }

    #[test]
    fn test_all_nodes_rules_fan_out() {
        let known = known(&["self", "controlplane", "worker"]);
        let rules = vec![SecurityGroupRuleSpec {
            name: "custom".to_string(),
            description: Some("Custom".to_string()),
            protocol: Some("tcp".to_string()),
            port_range_min: Some(9000),
            port_range_max: Some(9000),
            remote_managed_groups: names(&["controlplane", "worker"]),
            ..Default::default()
        }];

        let resolved = resolve_all_nodes_rules(&known, &rules).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].remote_group_id, "controlplane-id");
        assert_eq!(resolved[1].remote_group_id, "worker-id");
        assert!(resolved.iter().all(|r| r.port_range_min == 9000 && r.protocol == "tcp"));
    }

    #[test]
    fn test_all_nodes_cidr_rule_passes_through() {
        let known = known(&["self", "controlplane", "worker"]);
        let rules = vec![SecurityGroupRuleSpec {
            name: "monitoring".to_string(),
            remote_ip_prefix: Some("10.0.0.0/8".to_string()),
            ..Default::default()
        }];

        let resolved = resolve_all_nodes_rules(&known, &rules).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].remote_ip_prefix, "10.0.0.0/8");
        assert_eq!(resolved[0].remote_group_id, "");
    }

    #[test]
    fn test_all_nodes_rule_with_both_selectors_fails() {
        let known = known(&["self", "controlplane", "worker"]);
        let rules = vec![SecurityGroupRuleSpec {
            name: "both".to_string(),
            remote_ip_prefix: Some("10.0.0.0/8".to_string()),
            remote_managed_groups: names(&["worker"]),
            ..Default::default()
        }];

        let err = resolve_all_nodes_rules(&known, &rules).unwrap_err();

        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_all_nodes_rule_without_selector_fails() {
        let known = known(&["self", "controlplane", "worker"]);
        let rules = vec![SecurityGroupRuleSpec {
            name: "neither".to_string(),
            ..Default::default()
        }];

        assert!(resolve_all_nodes_rules(&known, &rules).is_err());
    }
}
