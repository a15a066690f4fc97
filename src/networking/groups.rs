//! Security group lifecycle

use tracing::{info, warn};

use crate::crd::v1beta1::SecurityGroupStatus;
use crate::error::{Error, Result};
use crate::metrics::SECURITY_GROUP_OPERATIONS;

use super::NetworkClient;

/// Make sure a group named `name` exists and return its status
///
/// An observed status that already carries an ID is returned as is. Otherwise
/// an existing group with this name is adopted together with its rules, or a
/// new one is created.
pub async fn ensure_security_group(
    network: &dyn NetworkClient,
    name: &str,
    description: &str,
    observed: &SecurityGroupStatus,
) -> Result<SecurityGroupStatus> {
    if !observed.id.is_empty() {
        return Ok(observed.clone());
    }

    let existing = network
        .list_security_groups(name)
        .await
        .map_err(|e| record_failure("list_group", e))?;

    match existing.as_slice() {
        [group] => {
            info!(group = %name, id = %group.id, "Adopting existing security group");
            Ok(SecurityGroupStatus::from(group))
        }
        [] => {
            let group = network
                .create_security_group(name, description)
                .await
                .map_err(|e| record_failure("create_group", e))?;
            SECURITY_GROUP_OPERATIONS
                .with_label_values(&["create_group", "success"])
                .inc();
            info!(group = %name, id = %group.id, "Created security group");
            Ok(SecurityGroupStatus::from(&group))
        }
        groups => Err(record_failure(
            "list_group",
            Error::remote_operation(
                "list_group",
                format!("found {} security groups named {}", groups.len(), name),
            ),
        )),
    }
}

/// Delete the group behind `status`. A group that is already gone is fine.
pub async fn delete_security_group(
    network: &dyn NetworkClient,
    status: &SecurityGroupStatus,
) -> Result<()> {
    if status.id.is_empty() {
        return Ok(());
    }

    match network.delete_security_group(&status.id).await {
        Ok(()) => {
            SECURITY_GROUP_OPERATIONS
                .with_label_values(&["delete_group", "success"])
                .inc();
            info!(group = %status.name, id = %status.id, "Deleted security group");
            Ok(())
        }
        Err(Error::NotFound(_)) => {
            warn!(group = %status.name, id = %status.id, "Security group already deleted");
            Ok(())
        }
        Err(e) => Err(record_failure("delete_group", e)),
    }
}

/// Delete the group named `name`, whether or not its ID was recorded
///
/// The recorded group is deleted first, then every group still listed under
/// `name` is deleted too, so a group whose status was lost does not leak.
pub async fn delete_managed_security_group(
    network: &dyn NetworkClient,
    name: &str,
    recorded: Option<&SecurityGroupStatus>,
) -> Result<()> {
    if let Some(recorded) = recorded {
        delete_security_group(network, recorded).await?;
    }

    let remaining = network
        .list_security_groups(name)
        .await
        .map_err(|e| record_failure("list_group", e))?;
    for group in &remaining {
        delete_security_group(network, &SecurityGroupStatus::from(group)).await?;
    }
    Ok(())
}

/// Count a failed remote call and wrap it
///
/// Errors that already name their remote operation are passed through.
pub(crate) fn record_failure(operation: &str, error: Error) -> Error {
    SECURITY_GROUP_OPERATIONS
        .with_label_values(&[operation, "failure"])
        .inc();
    match error {
        e @ Error::RemoteOperation { .. } => e,
        other => Error::remote_operation(operation, other),
    }
}
