//! Security group rule reconciliation
//!
//! Rules are compared by value. The server-assigned rule ID never takes part
//! in matching, so a rule edited out of band is replaced rather than patched.

use tracing::{debug, info, warn};

use crate::crd::v1beta1::{SecurityGroupRuleStatus, SecurityGroupStatus};
use crate::error::{Error, PartialResult, PartialStatus};
use crate::metrics::SECURITY_GROUP_OPERATIONS;

use super::groups::{ensure_security_group, record_failure};
use super::{CreateSecurityGroupRuleOpts, NetworkClient, ResolvedSecurityGroupRuleSpec, SecurityGroupSpec};

/// Bring the rules of one security group in line with `desired`
///
/// The group is looked up or created first when `observed` has no ID. Stale
/// rules are then deleted and missing rules created, stopping at the first
/// failed call. The returned status lists the kept rules in their observed
/// order followed by the created rules.
///
/// On failure the error carries the status as it stands after the calls that
/// succeeded: deleted rules removed, created rules appended.
pub async fn reconcile_group_rules(
    network: &dyn NetworkClient,
    desired: &SecurityGroupSpec,
    observed: &SecurityGroupStatus,
) -> PartialResult<SecurityGroupStatus> {
    let group = if observed.id.is_empty() && !desired.name.is_empty() {
        ensure_security_group(network, &desired.name, &desired.description, observed)
            .await
            .map_err(|e| PartialStatus::new(observed.clone(), e))?
    } else {
        observed.clone()
    };

    let desired_rules: Vec<ResolvedSecurityGroupRuleSpec> = desired
        .rules
        .iter()
        .map(|rule| rule.for_group(&group.id))
        .collect();

    let (kept, stale): (Vec<&SecurityGroupRuleStatus>, Vec<&SecurityGroupRuleStatus>) = group
        .rules
        .iter()
        .partition(|observed_rule| desired_rules.iter().any(|rule| rule.matches(observed_rule)));

    let missing: Vec<&ResolvedSecurityGroupRuleSpec> = desired_rules
        .iter()
        .filter(|rule| !kept.iter().any(|observed_rule| rule.matches(observed_rule)))
        .collect();

    if stale.is_empty() && missing.is_empty() {
        debug!(group = %group.name, rules = kept.len(), "Security group rules up to date");
        return Ok(group);
    }

    if group.id.is_empty() {
        let error = Error::validation(format!(
            "cannot reconcile rules of security group '{}' without an ID",
            desired.name
        ));
        return Err(PartialStatus::new(group, error));
    }

    let mut status = group.clone();

    for rule in &stale {
        info!(group = %group.name, rule_id = %rule.id, "Deleting stale security group rule");
        match network.delete_security_group_rule(&rule.id).await {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                warn!(group = %group.name, rule_id = %rule.id, "Security group rule already deleted");
            }
            Err(e) => return Err(PartialStatus::new(status, record_failure("delete_rule", e))),
        }
        SECURITY_GROUP_OPERATIONS
            .with_label_values(&["delete_rule", "success"])
            .inc();
        status.rules.retain(|r| r.id != rule.id);
    }

    for rule in missing {
        info!(
            group = %group.name,
            description = %rule.description,
            direction = %rule.direction,
            protocol = %rule.protocol,
            port_min = rule.port_range_min,
            port_max = rule.port_range_max,
            "Creating security group rule"
        );
        let created = match network
            .create_security_group_rule(&create_opts(&group.id, rule))
            .await
        {
            Ok(created) => created,
            Err(e) => return Err(PartialStatus::new(status, record_failure("create_rule", e))),
        };
        SECURITY_GROUP_OPERATIONS
            .with_label_values(&["create_rule", "success"])
            .inc();
        status.rules.push(SecurityGroupRuleStatus::from(&created));
    }

    Ok(status)
}

fn create_opts(group_id: &str, rule: &ResolvedSecurityGroupRuleSpec) -> CreateSecurityGroupRuleOpts {
    CreateSecurityGroupRuleOpts {
        security_group_id: group_id.to_string(),
        description: rule.description.clone(),
        direction: rule.direction.clone(),
        ether_type: rule.ether_type.clone(),
        protocol: rule.protocol.clone(),
        port_range_min: rule.port_range_min,
        port_range_max: rule.port_range_max,
        remote_group_id: rule.remote_group_id.clone(),
        remote_ip_prefix: rule.remote_ip_prefix.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::{MockNetworkClient, SecurityGroupRule};

    // ========================================================================
    // Test Helpers
    // ========================================================================

    fn ssh_rule() -> ResolvedSecurityGroupRuleSpec {
        ResolvedSecurityGroupRuleSpec {
            description: "Allow SSH".to_string(),
            direction: "ingress".to_string(),
            ether_type: "IPv4".to_string(),
            protocol: "tcp".to_string(),
            port_range_min: 22,
            port_range_max: 22,
            remote_group_id: String::new(),
            remote_ip_prefix: String::new(),
        }
    }

    fn ssh_status(id: &str) -> SecurityGroupRuleStatus {
        SecurityGroupRuleStatus {
            id: id.to_string(),
            description: Some("Allow SSH".to_string()),
            direction: "ingress".to_string(),
            ether_type: Some("IPv4".to_string()),
            protocol: Some("tcp".to_string()),
            port_range_min: Some(22),
            port_range_max: Some(22),
            remote_group_id: None,
            remote_ip_prefix: None,
        }
    }

    fn legacy_status() -> SecurityGroupRuleStatus {
        SecurityGroupRuleStatus {
            id: "idSGRuleLegacy".to_string(),
            description: Some("Legacy".to_string()),
            direction: "ingress".to_string(),
            ether_type: Some("IPv4".to_string()),
            protocol: Some("tcp".to_string()),
            port_range_min: Some(222),
            port_range_max: Some(222),
            remote_group_id: None,
            remote_ip_prefix: None,
        }
    }

    fn group(rules: Vec<SecurityGroupRuleStatus>) -> SecurityGroupStatus {
        SecurityGroupStatus {
            id: "idSG".to_string(),
            name: "k8s-test-secgroup".to_string(),
            rules,
        }
    }

    fn spec(rules: Vec<ResolvedSecurityGroupRuleSpec>) -> SecurityGroupSpec {
        SecurityGroupSpec {
            name: "k8s-test-secgroup".to_string(),
            description: "test".to_string(),
            rules,
        }
    }

    fn echo_created(opts: &CreateSecurityGroupRuleOpts, id: &str) -> SecurityGroupRule {
        SecurityGroupRule {
            id: id.to_string(),
            security_group_id: opts.security_group_id.clone(),
            description: opts.description.clone(),
            direction: opts.direction.clone(),
            ether_type: opts.ether_type.clone(),
            protocol: opts.protocol.clone(),
            port_range_min: opts.port_range_min,
            port_range_max: opts.port_range_max,
            remote_group_id: opts.remote_group_id.clone(),
            remote_ip_prefix: opts.remote_ip_prefix.clone(),
        }
    }

    // ========================================================================
    // Reconciliation Tests
    // ========================================================================

    #[tokio::test]
    async fn test_empty_desired_and_observed() {
        let network = MockNetworkClient::new();

        let status = reconcile_group_rules(
            &network,
            &SecurityGroupSpec::default(),
            &SecurityGroupStatus::default(),
        )
        .await
        .unwrap();

        assert_eq!(status, SecurityGroupStatus::default());
    }

    #[tokio::test]
    async fn test_same_rules_make_no_calls() {
        let mut network = MockNetworkClient::new();
        network.expect_create_security_group_rule().never();
        network.expect_delete_security_group_rule().never();
        let observed = group(vec![ssh_status("idSGRule")]);

        let status = reconcile_group_rules(&network, &spec(vec![ssh_rule()]), &observed)
            .await
            .unwrap();

        assert_eq!(status, observed);
    }

    #[tokio::test]
    async fn test_replaces_legacy_rule() {
        let mut network = MockNetworkClient::new();
        network
            .expect_delete_security_group_rule()
            .withf(|id| id == "idSGRuleLegacy")
            .times(1)
            .returning(|_| Ok(()));
        network
            .expect_create_security_group_rule()
            .withf(|opts| opts.security_group_id == "idSG" && opts.port_range_min == 22)
            .times(1)
            .returning(|opts| Ok(echo_created(opts, "idSGRule")));

        let status = reconcile_group_rules(&network, &spec(vec![ssh_rule()]), &group(vec![legacy_status()]))
            .await
            .unwrap();

        let mut expected = ssh_status("idSGRule");
        expected.remote_group_id = Some(String::new());
        expected.remote_ip_prefix = Some(String::new());
        assert_eq!(status, group(vec![expected]));
    }

    #[tokio::test]
    async fn test_only_missing_rules_are_created() {
        let mut kubelet = ssh_rule();
        kubelet.description = "Kubelet API".to_string();
        kubelet.port_range_min = 10250;
        kubelet.port_range_max = 10250;

        let mut network = MockNetworkClient::new();
        network.expect_delete_security_group_rule().never();
        network
            .expect_create_security_group_rule()
            .withf(|opts| opts.port_range_min == 10250)
            .times(1)
            .returning(|opts| Ok(echo_created(opts, "idKubelet")));

        let status = reconcile_group_rules(
            &network,
            &spec(vec![ssh_rule(), kubelet]),
            &group(vec![ssh_status("idSGRule")]),
        )
        .await
        .unwrap();

        let ids: Vec<_> = status.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["idSGRule", "idKubelet"]);
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let mut network = MockNetworkClient::new();
        network
            .expect_create_security_group_rule()
            .times(1)
            .returning(|opts| Ok(echo_created(opts, "idSGRule")));
        network.expect_delete_security_group_rule().never();
        let desired = spec(vec![ssh_rule()]);

        let first = reconcile_group_rules(&network, &desired, &group(vec![])).await.unwrap();
        let second = reconcile_group_rules(&network, &desired, &first).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_self_placeholder_resolves_to_group_id() {
        let mut self_rule = ssh_rule();
        self_rule.remote_group_id = "self".to_string();

        let mut network = MockNetworkClient::new();
        network
            .expect_create_security_group_rule()
            .withf(|opts| opts.remote_group_id == "idSG")
            .times(1)
            .returning(|opts| Ok(echo_created(opts, "idSelf")));

        let status = reconcile_group_rules(&network, &spec(vec![self_rule]), &group(vec![]))
            .await
            .unwrap();

        assert_eq!(status.rules[0].remote_group_id.as_deref(), Some("idSG"));
    }

    #[tokio::test]
    async fn test_delete_failure_stops_the_pass() {
        let mut network = MockNetworkClient::new();
        network
            .expect_delete_security_group_rule()
            .returning(|_| Err(Error::remote_operation("delete_rule", "conflict")));
        network.expect_create_security_group_rule().never();

        let result =
            reconcile_group_rules(&network, &spec(vec![ssh_rule()]), &group(vec![legacy_status()])).await;

        let partial = result.unwrap_err();
        assert!(matches!(partial.error, Error::RemoteOperation { .. }));
        assert_eq!(partial.error.to_string(), "Remote operation 'delete_rule' failed: conflict");
        // The rule was not deleted, so it is still recorded
        assert_eq!(partial.status, group(vec![legacy_status()]));
    }

    #[tokio::test]
    async fn test_partial_deletes_are_reported() {
        let mut second = legacy_status();
        second.id = "idSGRuleLegacy2".to_string();
        second.port_range_min = Some(223);
        second.port_range_max = Some(223);

        let mut network = MockNetworkClient::new();
        network
            .expect_delete_security_group_rule()
            .withf(|id| id == "idSGRuleLegacy")
            .times(1)
            .returning(|_| Ok(()));
        network
            .expect_delete_security_group_rule()
            .withf(|id| id == "idSGRuleLegacy2")
            .times(1)
            .returning(|_| Err(Error::remote_operation("delete_rule", "503")));
        network.expect_create_security_group_rule().never();

        let result = reconcile_group_rules(
            &network,
            &spec(vec![ssh_rule()]),
            &group(vec![legacy_status(), second.clone()]),
        )
        .await;

        let partial = result.unwrap_err();
        assert_eq!(partial.status, group(vec![second]));
    }

    #[tokio::test]
    async fn test_already_deleted_rule_counts_as_deleted() {
        let mut network = MockNetworkClient::new();
        network
            .expect_delete_security_group_rule()
            .times(1)
            .returning(|id| Err(Error::NotFound(id.to_string())));
        network
            .expect_create_security_group_rule()
            .times(1)
            .returning(|opts| Ok(echo_created(opts, "idSGRule")));

        let status = reconcile_group_rules(&network, &spec(vec![ssh_rule()]), &group(vec![legacy_status()]))
            .await
            .unwrap();

        let ids: Vec<_> = status.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["idSGRule"]);
    }

    #[tokio::test]
    async fn test_create_failure_keeps_created_rules() {
        let mut kubelet = ssh_rule();
        kubelet.description = "Kubelet API".to_string();
        kubelet.port_range_min = 10250;
        kubelet.port_range_max = 10250;

        let mut network = MockNetworkClient::new();
        network
            .expect_create_security_group_rule()
            .withf(|opts| opts.port_range_min == 22)
            .times(1)
            .returning(|opts| Ok(echo_created(opts, "idSGRule")));
        network
            .expect_create_security_group_rule()
            .withf(|opts| opts.port_range_min == 10250)
            .times(1)
            .returning(|_| Err(Error::NotFound("idSG".to_string())));

        let result = reconcile_group_rules(&network, &spec(vec![ssh_rule(), kubelet]), &group(vec![])).await;

        let partial = result.unwrap_err();
        assert!(matches!(partial.error, Error::RemoteOperation { .. }));
        let ids: Vec<_> = partial.status.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["idSGRule"]);
    }

    #[tokio::test]
    async fn test_missing_group_is_created_first() {
        let mut network = MockNetworkClient::new();
        network.expect_list_security_groups().returning(|_| Ok(vec![]));
        network.expect_create_security_group().times(1).returning(|name, _| {
            Ok(crate::networking::SecurityGroup {
                id: "idSG".to_string(),
                name: name.to_string(),
                ..Default::default()
            })
        });
        network
            .expect_create_security_group_rule()
            .times(1)
            .returning(|opts| Ok(echo_created(opts, "idSGRule")));

        let status = reconcile_group_rules(&network, &spec(vec![ssh_rule()]), &SecurityGroupStatus::default())
            .await
            .unwrap();

        assert_eq!(status.id, "idSG");
        assert_eq!(status.rules.len(), 1);
    }
}
