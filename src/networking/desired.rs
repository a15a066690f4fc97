//! Desired security groups for a cluster
//!
//! Each role gets a baseline rule set from a [`BaselinePolicy`]. The user's
//! all-nodes rules are appended to the control plane and worker groups.

use tracing::debug;

use crate::crd::v1beta1::{ManagedSecurityGroupName, ManagedSecurityGroups, OpenStackClusterSpec};
use crate::error::{Error, Result};

use super::names::{description, security_group_name};
use super::resolver::{resolve_all_nodes_rules, RemoteManagedGroups};
use super::{ResolvedSecurityGroupRuleSpec, SecurityGroupSpec};

const DIRECTION_INGRESS: &str = "ingress";
const DIRECTION_EGRESS: &str = "egress";
const ETHER_TYPE_IPV4: &str = "IPv4";
const ETHER_TYPE_IPV6: &str = "IPv6";
const PROTOCOL_TCP: &str = "tcp";
const PROTOCOL_UDP: &str = "udp";

/// Source of the rules every managed group starts with
pub trait BaselinePolicy: Send + Sync {
    /// Baseline rules for `role`. Remote groups are looked up in `known`.
    fn baseline_rules(
        &self,
        role: &ManagedSecurityGroupName,
        known: &RemoteManagedGroups,
        config: &ManagedSecurityGroups,
    ) -> Result<Vec<ResolvedSecurityGroupRuleSpec>>;
}

/// Baseline needed by a kubeadm cluster
#[derive(Clone, Debug, Default)]
pub struct DefaultBaselinePolicy;

impl BaselinePolicy for DefaultBaselinePolicy {
    fn baseline_rules(
        &self,
        role: &ManagedSecurityGroupName,
        known: &RemoteManagedGroups,
        config: &ManagedSecurityGroups,
    ) -> Result<Vec<ResolvedSecurityGroupRuleSpec>> {
        let mut rules = egress_rules();

        match role.as_str() {
            ManagedSecurityGroupName::CONTROL_PLANE => {
                rules.push(tcp("Kubernetes API", 6443, 6443, ""));
                rules.extend(in_cluster_rules(
                    known,
                    config,
                    ManagedSecurityGroupName::WORKER,
                    &[("Etcd", 2379, 2380, false), ("Kubelet API", 10250, 10250, true)],
                )?);
            }
            ManagedSecurityGroupName::WORKER => {
                rules.push(port_range("Node Port Services", PROTOCOL_TCP, 30000, 32767));
                rules.push(port_range("Node Port Services", PROTOCOL_UDP, 30000, 32767));
                rules.extend(in_cluster_rules(
                    known,
                    config,
                    ManagedSecurityGroupName::CONTROL_PLANE,
                    &[("Kubelet API", 10250, 10250, true)],
                )?);
            }
            ManagedSecurityGroupName::BASTION => {
                let mut ssh = tcp("SSH", 22, 22, "");
                ssh.remote_ip_prefix = "0.0.0.0/0".to_string();
                rules.push(ssh);
                return Ok(rules);
            }
            other => {
                return Err(Error::validation(format!(
                    "no baseline rules for security group role '{}'",
                    other
                )))
            }
        }

        if let Some(bastion) = known.get(ManagedSecurityGroupName::BASTION) {
            rules.push(tcp("SSH", 22, 22, bastion));
        }

        Ok(rules)
    }
}

/// Build one [`SecurityGroupSpec`] per managed role
///
/// Roles come out as control plane, worker, then bastion when enabled.
/// Returns nothing when security groups are managed externally.
pub fn build_desired_security_groups(
    cluster_name: &str,
    spec: &OpenStackClusterSpec,
    known: &RemoteManagedGroups,
    policy: &dyn BaselinePolicy,
) -> Result<Vec<(ManagedSecurityGroupName, SecurityGroupSpec)>> {
    let Some(config) = spec.managed_security_groups.as_ref() else {
        return Ok(Vec::new());
    };

    let all_nodes_rules = resolve_all_nodes_rules(known, &config.all_nodes_security_group_rules)?;

    let mut desired = Vec::new();
    for role in managed_roles(spec.bastion_enabled()) {
        let mut rules = policy.baseline_rules(&role, known, config)?;
        if role.as_str() != ManagedSecurityGroupName::BASTION {
            rules.extend(all_nodes_rules.iter().cloned());
        }

        debug!(role = %role, rules = rules.len(), "Built desired security group");

        desired.push((
            role.clone(),
            SecurityGroupSpec {
                name: security_group_name(cluster_name, &role),
                description: description(cluster_name),
                rules,
            },
        ));
    }
    Ok(desired)
}

/// Managed roles in reconciliation order
pub fn managed_roles(bastion_enabled: bool) -> Vec<ManagedSecurityGroupName> {
    let mut roles = vec![
        ManagedSecurityGroupName::control_plane(),
        ManagedSecurityGroupName::worker(),
    ];
    if bastion_enabled {
        roles.push(ManagedSecurityGroupName::bastion());
    }
    roles
}

fn egress_rules() -> Vec<ResolvedSecurityGroupRuleSpec> {
    [ETHER_TYPE_IPV4, ETHER_TYPE_IPV6]
        .into_iter()
        .map(|ether_type| ResolvedSecurityGroupRuleSpec {
            description: "Full open".to_string(),
            direction: DIRECTION_EGRESS.to_string(),
            ether_type: ether_type.to_string(),
            ..Default::default()
        })
        .collect()
}

/// Node-to-node rules. `ports` entries are (description, min, max, from_peer);
/// allow-all mode replaces them with one open rule from self and one from the peer.
fn in_cluster_rules(
    known: &RemoteManagedGroups,
    config: &ManagedSecurityGroups,
    peer: &str,
    ports: &[(&str, i32, i32, bool)],
) -> Result<Vec<ResolvedSecurityGroupRuleSpec>> {
    let self_id = group_id(known, ManagedSecurityGroupName::SELF)?;
    let peer_id = group_id(known, peer)?;

    if config.allow_all_in_cluster_traffic {
        return Ok([self_id, peer_id]
            .into_iter()
            .map(|remote| ResolvedSecurityGroupRuleSpec {
                description: "In-cluster Ingress".to_string(),
                direction: DIRECTION_INGRESS.to_string(),
                ether_type: ETHER_TYPE_IPV4.to_string(),
                remote_group_id: remote.to_string(),
                ..Default::default()
            })
            .collect());
    }

    let mut rules = Vec::new();
    for (desc, min, max, from_peer) in ports {
        rules.push(tcp(desc, *min, *max, self_id));
        if *from_peer {
            rules.push(tcp(desc, *min, *max, peer_id));
        }
    }
    Ok(rules)
}

fn group_id<'a>(known: &'a RemoteManagedGroups, role: &str) -> Result<&'a str> {
    known
        .get(role)
        .map(String::as_str)
        .ok_or_else(|| Error::validation(format!("security group '{}' is not known", role)))
}

fn tcp(desc: &str, min: i32, max: i32, remote_group_id: &str) -> ResolvedSecurityGroupRuleSpec {
    ResolvedSecurityGroupRuleSpec {
        remote_group_id: remote_group_id.to_string(),
        ..port_range(desc, PROTOCOL_TCP, min, max)
    }
}

fn port_range(desc: &str, protocol: &str, min: i32, max: i32) -> ResolvedSecurityGroupRuleSpec {
    ResolvedSecurityGroupRuleSpec {
        description: desc.to_string(),
        direction: DIRECTION_INGRESS.to_string(),
        ether_type: ETHER_TYPE_IPV4.to_string(),
        protocol: protocol.to_string(),
        port_range_min: min,
        port_range_max: max,
        ..Default::default()
    }
}
