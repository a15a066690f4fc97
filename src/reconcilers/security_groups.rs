//! OpenStackCluster security group reconciler
//!
//! Handles the managed security groups of a cluster:
//! - Spec validation
//! - Group creation and adoption
//! - Rule reconciliation per role
//! - Removal of the bastion group once the bastion is disabled

use kube::ResourceExt;
use tracing::{info, instrument, warn};

use crate::crd::v1beta1::{ManagedSecurityGroupName, OpenStackCluster, OpenStackClusterStatus, SecurityGroupStatus};
use crate::error::{PartialStatus, Result};
use crate::metrics;
use crate::networking::{
    build_desired_security_groups, delete_managed_security_group, ensure_security_group, managed_roles,
    names, reconcile_group_rules, resolve_all_nodes_rules, BaselinePolicy, NetworkClient,
    RemoteManagedGroups,
};

const KIND: &str = "OpenStackCluster";

/// Security groups recorded in the cluster status
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterSecurityGroups {
    pub control_plane: Option<SecurityGroupStatus>,
    pub worker: Option<SecurityGroupStatus>,
    pub bastion: Option<SecurityGroupStatus>,
}

impl ClusterSecurityGroups {
    /// Read the groups from an existing status
    pub fn from_status(status: Option<&OpenStackClusterStatus>) -> Self {
        match status {
            Some(status) => Self {
                control_plane: status.control_plane_security_group.clone(),
                worker: status.worker_security_group.clone(),
                bastion: status.bastion_security_group.clone(),
            },
            None => Self::default(),
        }
    }

    /// Write the groups into `status`
    pub fn apply_to(&self, status: &mut OpenStackClusterStatus) {
        status.control_plane_security_group = self.control_plane.clone();
        status.worker_security_group = self.worker.clone();
        status.bastion_security_group = self.bastion.clone();
    }

    pub fn get(&self, role: &ManagedSecurityGroupName) -> Option<&SecurityGroupStatus> {
        match role.as_str() {
            ManagedSecurityGroupName::CONTROL_PLANE => self.control_plane.as_ref(),
            ManagedSecurityGroupName::WORKER => self.worker.as_ref(),
            ManagedSecurityGroupName::BASTION => self.bastion.as_ref(),
            _ => None,
        }
    }

    fn set(&mut self, role: &ManagedSecurityGroupName, status: SecurityGroupStatus) {
        match role.as_str() {
            ManagedSecurityGroupName::CONTROL_PLANE => self.control_plane = Some(status),
            ManagedSecurityGroupName::WORKER => self.worker = Some(status),
            ManagedSecurityGroupName::BASTION => self.bastion = Some(status),
            other => warn!(role = %other, "Ignoring status for unknown security group role"),
        }
    }
}

/// Validate the managed security group configuration
///
/// Checks every all-nodes rule against the roles this cluster will have, so
/// that a bad spec fails before any remote call is made.
pub fn validate(cluster: &OpenStackCluster) -> Result<()> {
    let Some(config) = cluster.spec.managed_security_groups.as_ref() else {
        return Ok(());
    };

    let mut symbolic = RemoteManagedGroups::new();
    symbolic.insert(
        ManagedSecurityGroupName::SELF.to_string(),
        ManagedSecurityGroupName::SELF.to_string(),
    );
    for role in managed_roles(cluster.spec.bastion_enabled()) {
        symbolic.insert(role.to_string(), role.to_string());
    }

    resolve_all_nodes_rules(&symbolic, &config.all_nodes_security_group_rules)?;
    Ok(())
}

/// Reconcile the managed security groups of `cluster`
///
/// Returns `None` when security groups are managed externally. Otherwise
/// returns the groups to record in the cluster status. On failure the error
/// carries the groups as they stand after the calls that succeeded, which
/// should be recorded just the same.
#[instrument(skip(network, cluster, policy), fields(name = %cluster.name_any()))]
pub async fn reconcile_security_groups(
    network: &dyn NetworkClient,
    cluster: &OpenStackCluster,
    policy: &dyn BaselinePolicy,
) -> std::result::Result<Option<ClusterSecurityGroups>, PartialStatus<ClusterSecurityGroups>> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let result = reconcile(network, cluster, policy).await;
    if let Err(e) = &result {
        warn!(error = %e.error, "Security group reconciliation failed");
        metrics::RECONCILIATION_ERRORS.with_label_values(&[KIND]).inc();
    }
    result
}

async fn reconcile(
    network: &dyn NetworkClient,
    cluster: &OpenStackCluster,
    policy: &dyn BaselinePolicy,
) -> std::result::Result<Option<ClusterSecurityGroups>, PartialStatus<ClusterSecurityGroups>> {
    if cluster.spec.managed_security_groups.is_none() {
        info!("Security groups are managed externally, skipping");
        return Ok(None);
    }

    let mut groups = ClusterSecurityGroups::from_status(cluster.status.as_ref());

    if let Err(e) = validate(cluster) {
        return Err(PartialStatus::new(groups, e));
    }

    let cluster_name = cluster.name_any();
    let description = names::description(&cluster_name);

    // Every group must exist before rules can reference each other
    let mut known = RemoteManagedGroups::new();
    known.insert(
        ManagedSecurityGroupName::SELF.to_string(),
        ManagedSecurityGroupName::SELF.to_string(),
    );
    for role in managed_roles(cluster.spec.bastion_enabled()) {
        let observed = groups.get(&role).cloned().unwrap_or_default();
        let name = names::security_group_name(&cluster_name, &role);
        let ensured = match ensure_security_group(network, &name, &description, &observed).await {
            Ok(ensured) => ensured,
            Err(e) => return Err(PartialStatus::new(groups, e)),
        };
        known.insert(role.to_string(), ensured.id.clone());
        groups.set(&role, ensured);
    }

    let desired = match build_desired_security_groups(&cluster_name, &cluster.spec, &known, policy) {
        Ok(desired) => desired,
        Err(e) => return Err(PartialStatus::new(groups, e)),
    };
    for (role, spec) in &desired {
        let observed = groups.get(role).cloned().unwrap_or_default();
        match reconcile_group_rules(network, spec, &observed).await {
            Ok(reconciled) => groups.set(role, reconciled),
            Err(partial) => {
                groups.set(role, partial.status);
                return Err(PartialStatus::new(groups, partial.error));
            }
        }
    }

    if !cluster.spec.bastion_enabled() {
        let bastion = groups.bastion.take();
        let name = names::security_group_name(&cluster_name, &ManagedSecurityGroupName::bastion());
        if let Err(e) = delete_managed_security_group(network, &name, bastion.as_ref()).await {
            groups.bastion = bastion;
            return Err(PartialStatus::new(groups, e));
        }
        if bastion.is_some() {
            info!(group = %name, "Bastion disabled, deleted its security group");
        }
    }

    info!(groups = desired.len(), "Security groups reconciled");
    Ok(Some(groups))
}

/// Delete every managed security group of the cluster
///
/// Groups are found by their recorded ID and by name, so groups missing from
/// the status are deleted too. Groups that are already gone are skipped.
#[instrument(skip(network, cluster), fields(name = %cluster.name_any()))]
pub async fn delete_security_groups(network: &dyn NetworkClient, cluster: &OpenStackCluster) -> Result<()> {
    let cluster_name = cluster.name_any();
    let groups = ClusterSecurityGroups::from_status(cluster.status.as_ref());
    for role in [
        ManagedSecurityGroupName::bastion(),
        ManagedSecurityGroupName::worker(),
        ManagedSecurityGroupName::control_plane(),
    ] {
        let name = names::security_group_name(&cluster_name, &role);
        delete_managed_security_group(network, &name, groups.get(&role)).await?;
    }
    Ok(())
}
