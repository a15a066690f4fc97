//! OpenStackMachine conversion between v1alpha7 and the v1beta1 hub
//!
//! `up` and `down` are total field-by-field mappings. Whatever one version
//! cannot represent is carried across a round trip by the restorer tables
//! built in [`v1alpha7_machine_restorer`] and [`v1beta1_machine_restorer`].

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::restore::{
    convert_and_restore, HashedFieldRestorer, RestorerFor, UnconditionalFieldRestorer,
};
use crate::crd::{v1alpha7, v1beta1};
use crate::error::{Error, Result};
use crate::metrics;

/// Kind handled by this converter
pub const KIND: &str = "OpenStackMachine";

/// Longest server metadata key or value accepted by v1beta1
pub const MAX_SERVER_METADATA_LENGTH: usize = 255;

const PROFILE_CAPABILITIES: &str = "capabilities";
const PROFILE_SWITCHDEV: &str = "switchdev";
const PROFILE_TRUSTED: &str = "trusted";

/// Identity secrets are always referenced by kind in v1alpha7
const IDENTITY_KIND: &str = "Secret";

/// Convert a v1alpha7 machine to the hub, restoring cached hub-only fields
pub fn convert_to_hub(src: &v1alpha7::OpenStackMachine) -> Result<v1beta1::OpenStackMachine> {
    convert_and_restore(
        src,
        up,
        down,
        &v1alpha7_machine_restorer(),
        &v1beta1_machine_restorer(),
    )
}

/// Convert a hub machine to v1alpha7, restoring cached v1alpha7-only fields
pub fn convert_from_hub(src: &v1beta1::OpenStackMachine) -> Result<v1alpha7::OpenStackMachine> {
    convert_and_restore(
        src,
        down,
        up,
        &v1beta1_machine_restorer(),
        &v1alpha7_machine_restorer(),
    )
}

/// Convert an OpenStackMachine object between served versions
///
/// Entry point for the serialization boundary. The source version is taken
/// from the object's `apiVersion`.
pub fn convert_machine(object: Value, target_api_version: &str) -> Result<Value> {
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
    if kind != KIND {
        return Err(Error::conversion_contract(format!(
            "cannot convert kind '{}', expected {}",
            kind, KIND
        )));
    }
    let source_api_version = object
        .get("apiVersion")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let result = match (source_api_version.as_str(), target_api_version) {
        (from, to) if from == to && is_served(from) => Ok(object),
        (v1alpha7::API_VERSION, v1beta1::API_VERSION) => {
            let src: v1alpha7::OpenStackMachine = serde_json::from_value(object)?;
            Ok(serde_json::to_value(convert_to_hub(&src)?)?)
        }
        (v1beta1::API_VERSION, v1alpha7::API_VERSION) => {
            let src: v1beta1::OpenStackMachine = serde_json::from_value(object)?;
            Ok(serde_json::to_value(convert_from_hub(&src)?)?)
        }
        (from, to) => Err(Error::conversion_contract(format!(
            "unsupported {} conversion from '{}' to '{}'",
            KIND, from, to
        ))),
    };

    let outcome = if result.is_ok() { "success" } else { "failure" };
    metrics::CONVERSIONS
        .with_label_values(&[source_api_version.as_str(), target_api_version, outcome])
        .inc();
    match &result {
        Ok(_) => debug!(from = %source_api_version, to = %target_api_version, "Converted OpenStackMachine"),
        Err(e) => warn!(from = %source_api_version, to = %target_api_version, error = %e, "Conversion rejected"),
    }
    result
}

fn is_served(api_version: &str) -> bool {
    api_version == v1alpha7::API_VERSION || api_version == v1beta1::API_VERSION
}

/* Restorers */

/// Field groups of v1alpha7 that v1beta1 cannot represent
pub fn v1alpha7_machine_restorer() -> RestorerFor<v1alpha7::OpenStackMachine> {
    RestorerFor::new().with(
        "spec",
        HashedFieldRestorer::new(
            |m: &v1alpha7::OpenStackMachine| m.spec.clone(),
            |m: &mut v1alpha7::OpenStackMachine| &mut m.spec,
            restore_v1alpha7_machine_spec,
        ),
    )
}

/// Field groups of v1beta1 that v1alpha7 cannot represent
pub fn v1beta1_machine_restorer() -> RestorerFor<v1beta1::OpenStackMachine> {
    RestorerFor::new()
        .with(
            "spec",
            HashedFieldRestorer::new(
                |m: &v1beta1::OpenStackMachine| m.spec.clone(),
                |m: &mut v1beta1::OpenStackMachine| &mut m.spec,
                restore_v1beta1_machine_spec,
            ),
        )
        .with(
            "depresources",
            UnconditionalFieldRestorer::new(
                |m: &v1beta1::OpenStackMachine| {
                    m.status.as_ref().and_then(|s| s.dependent_resources.clone())
                },
                |m: &mut v1beta1::OpenStackMachine| {
                    &mut m.status.get_or_insert_with(Default::default).dependent_resources
                },
            ),
        )
        // No equivalent in v1alpha7
        .with(
            "refresources",
            UnconditionalFieldRestorer::new(
                |m: &v1beta1::OpenStackMachine| {
                    m.status.as_ref().and_then(|s| s.referenced_resources.clone())
                },
                |m: &mut v1beta1::OpenStackMachine| {
                    &mut m.status.get_or_insert_with(Default::default).referenced_resources
                },
            ),
        )
}

fn restore_v1alpha7_machine_spec(
    previous: &v1alpha7::OpenStackMachineSpec,
    dst: &mut v1alpha7::OpenStackMachineSpec,
) {
    dst.floating_ip = previous.floating_ip.clone();

    // Conversion to v1beta1 truncates keys and values
    for (key, value) in &previous.server_metadata {
        let truncated_key = truncate(key);
        let truncated_value = truncate(value);
        if &truncated_key != key || &truncated_value != value {
            dst.server_metadata.remove(&truncated_key);
            dst.server_metadata.insert(key.clone(), value.clone());
        }
    }

    dst.identity_ref = previous.identity_ref.clone();

    if dst.ports.len() == previous.ports.len() {
        for (previous, dst) in previous.ports.iter().zip(dst.ports.iter_mut()) {
            restore_v1alpha7_port(previous, dst);
        }
    }

    if dst.security_groups.len() == previous.security_groups.len() {
        for (previous, dst) in previous.security_groups.iter().zip(dst.security_groups.iter_mut()) {
            restore_v1alpha7_security_group_filter(previous, dst);
        }
    }

    // Conversion to v1beta1 drops the image name when the UUID is set
    if dst.image.is_empty() && !previous.image.is_empty() {
        dst.image = previous.image.clone();
    }
}

fn restore_v1alpha7_port(previous: &v1alpha7::PortOpts, dst: &mut v1alpha7::PortOpts) {
    // v1beta1 only models the flags it understands
    dst.profile = previous.profile.clone();

    if let (Some(previous), Some(dst)) = (&previous.network, &mut dst.network) {
        if previous.id == dst.id {
            dst.name = previous.name.clone();
        }
    }

    if dst.security_groups.len() == previous.security_groups.len() {
        for (previous, dst) in previous.security_groups.iter().zip(dst.security_groups.iter_mut()) {
            restore_v1alpha7_security_group_filter(previous, dst);
        }
    }
}

fn restore_v1alpha7_security_group_filter(
    previous: &v1alpha7::SecurityGroupFilter,
    dst: &mut v1alpha7::SecurityGroupFilter,
) {
    // Conversion to v1beta1 drops the filter when the ID is set, and
    // normalizes the tag list
    if previous.id == dst.id {
        dst.name = previous.name.clone();
        dst.description = previous.description.clone();
        dst.project_id = previous.project_id.clone();
        dst.tags = previous.tags.clone();
    }
}

fn restore_v1beta1_machine_spec(
    previous: &v1beta1::OpenStackMachineSpec,
    dst: &mut v1beta1::OpenStackMachineSpec,
) {
    dst.server_group = previous.server_group.clone();
    dst.image = previous.image.clone();
    dst.floating_ip_pool_ref = previous.floating_ip_pool_ref.clone();

    // v1alpha7 stores metadata as a map, losing order and duplicates
    dst.server_metadata = previous.server_metadata.clone();

    if dst.ports.len() == previous.ports.len() {
        for (previous, dst) in previous.ports.iter().zip(dst.ports.iter_mut()) {
            restore_v1beta1_port(previous, dst);
        }
    }

    if dst.security_groups.len() == previous.security_groups.len() {
        dst.security_groups = previous.security_groups.clone();
    }
}

fn restore_v1beta1_port(previous: &v1beta1::PortOpts, dst: &mut v1beta1::PortOpts) {
    dst.network = previous.network.clone();
    dst.profile = previous.profile.clone();
    dst.propagate_uplink_status = previous.propagate_uplink_status;
    dst.value_specs = previous.value_specs.clone();

    if dst.security_groups.len() == previous.security_groups.len() {
        dst.security_groups = previous.security_groups.clone();
    }
}

/* v1alpha7 -> v1beta1 */

/// Convert a v1alpha7 machine to v1beta1 without restoration
pub fn up(src: &v1alpha7::OpenStackMachine) -> v1beta1::OpenStackMachine {
    v1beta1::OpenStackMachine {
        metadata: src.metadata.clone(),
        spec: up_spec(&src.spec),
        status: src.status.as_ref().map(up_status),
    }
}

fn up_spec(spec: &v1alpha7::OpenStackMachineSpec) -> v1beta1::OpenStackMachineSpec {
    let image = if !spec.image_uuid.is_empty() {
        v1beta1::ImageParam {
            id: Some(spec.image_uuid.clone()),
            filter: None,
        }
    } else if !spec.image.is_empty() {
        // Only add the name when the ID is not set, v1beta1 can't hold both
        v1beta1::ImageParam {
            id: None,
            filter: Some(v1beta1::ImageFilter {
                name: Some(spec.image.clone()),
                tags: Vec::new(),
            }),
        }
    } else {
        v1beta1::ImageParam::default()
    };

    let mut identity_ref = spec
        .identity_ref
        .as_ref()
        .map(|r| v1beta1::OpenStackIdentityReference {
            name: r.name.clone(),
            cloud_name: String::new(),
        });
    if !spec.cloud_name.is_empty() {
        identity_ref.get_or_insert_with(Default::default).cloud_name = spec.cloud_name.clone();
    }

    let server_group = non_empty(&spec.server_group_id).map(|id| v1beta1::ServerGroupParam {
        id: Some(id),
        filter: None,
    });

    // Truncate keys and values, which were not validated before v1beta1
    let server_metadata = spec
        .server_metadata
        .iter()
        .map(|(key, value)| v1beta1::ServerMetadata {
            key: truncate(key),
            value: truncate(value),
        })
        .collect();

    v1beta1::OpenStackMachineSpec {
        provider_id: spec.provider_id.clone(),
        flavor: spec.flavor.clone(),
        image,
        ssh_key_name: spec.ssh_key_name.clone(),
        ports: spec.ports.iter().map(up_port).collect(),
        security_groups: spec.security_groups.iter().map(up_security_group).collect(),
        trunk: spec.trunk,
        tags: spec.tags.clone(),
        server_metadata,
        config_drive: spec.config_drive,
        server_group,
        identity_ref,
        floating_ip_pool_ref: None,
    }
}

fn up_port(port: &v1alpha7::PortOpts) -> v1beta1::PortOpts {
    v1beta1::PortOpts {
        network: port.network.as_ref().map(up_network),
        description: non_empty(&port.description),
        name_suffix: non_empty(&port.name_suffix),
        fixed_ips: port.fixed_ips.clone(),
        security_groups: port.security_groups.iter().map(up_security_group).collect(),
        tags: port.tags.clone(),
        trunk: port.trunk,
        vnic_type: non_empty(&port.vnic_type),
        profile: up_binding_profile(&port.profile),
        disable_port_security: port.disable_port_security,
        propagate_uplink_status: None,
        value_specs: Vec::new(),
    }
}

fn up_network(network: &v1alpha7::NetworkFilter) -> v1beta1::NetworkParam {
    if !network.id.is_empty() {
        return v1beta1::NetworkParam {
            id: Some(network.id.clone()),
            filter: None,
        };
    }
    v1beta1::NetworkParam {
        id: None,
        filter: non_empty(&network.name).map(|name| v1beta1::NetworkFilter { name: Some(name) }),
    }
}

fn up_security_group(filter: &v1alpha7::SecurityGroupFilter) -> v1beta1::SecurityGroupParam {
    if !filter.id.is_empty() {
        return v1beta1::SecurityGroupParam {
            id: Some(filter.id.clone()),
            filter: None,
        };
    }
    let converted = v1beta1::SecurityGroupFilter {
        name: filter.name.clone(),
        description: filter.description.clone(),
        project_id: filter.project_id.clone(),
        tags: split_tags(&filter.tags),
    };
    v1beta1::SecurityGroupParam {
        id: None,
        filter: (converted != v1beta1::SecurityGroupFilter::default()).then_some(converted),
    }
}

fn up_binding_profile(profile: &BTreeMap<String, String>) -> Option<v1beta1::BindingProfile> {
    let ovs_hw_offload = profile
        .get(PROFILE_CAPABILITIES)
        .filter(|c| c.contains(PROFILE_SWITCHDEV))
        .map(|_| true);
    let trusted_vf = profile
        .get(PROFILE_TRUSTED)
        .filter(|t| t.as_str() == "true")
        .map(|_| true);

    if ovs_hw_offload.is_none() && trusted_vf.is_none() {
        return None;
    }
    Some(v1beta1::BindingProfile {
        ovs_hw_offload,
        trusted_vf,
    })
}

fn up_status(status: &v1alpha7::OpenStackMachineStatus) -> v1beta1::OpenStackMachineStatus {
    v1beta1::OpenStackMachineStatus {
        ready: status.ready,
        instance_id: status.instance_id.clone(),
        instance_state: status.instance_state.clone(),
        dependent_resources: None,
        referenced_resources: None,
        failure_reason: status.failure_reason.clone(),
        failure_message: status.failure_message.clone(),
    }
}

/* v1beta1 -> v1alpha7 */

/// Convert a v1beta1 machine to v1alpha7 without restoration
pub fn down(src: &v1beta1::OpenStackMachine) -> v1alpha7::OpenStackMachine {
    v1alpha7::OpenStackMachine {
        metadata: src.metadata.clone(),
        spec: down_spec(&src.spec),
        status: src.status.as_ref().map(down_status),
    }
}

fn down_spec(spec: &v1beta1::OpenStackMachineSpec) -> v1alpha7::OpenStackMachineSpec {
    let image = spec
        .image
        .filter
        .as_ref()
        .and_then(|f| f.name.clone())
        .unwrap_or_default();
    let image_uuid = spec.image.id.clone().unwrap_or_default();

    let server_metadata = spec
        .server_metadata
        .iter()
        .map(|m| (m.key.clone(), m.value.clone()))
        .collect();

    v1alpha7::OpenStackMachineSpec {
        provider_id: spec.provider_id.clone(),
        cloud_name: spec
            .identity_ref
            .as_ref()
            .map(|r| r.cloud_name.clone())
            .unwrap_or_default(),
        flavor: spec.flavor.clone(),
        image,
        image_uuid,
        ssh_key_name: spec.ssh_key_name.clone(),
        ports: spec.ports.iter().map(down_port).collect(),
        security_groups: spec.security_groups.iter().map(down_security_group).collect(),
        trunk: spec.trunk,
        tags: spec.tags.clone(),
        server_metadata,
        config_drive: spec.config_drive,
        server_group_id: spec
            .server_group
            .as_ref()
            .and_then(|g| g.id.clone())
            .unwrap_or_default(),
        identity_ref: spec
            .identity_ref
            .as_ref()
            .map(|r| v1alpha7::OpenStackIdentityReference {
                kind: IDENTITY_KIND.to_string(),
                name: r.name.clone(),
            }),
        floating_ip: String::new(),
    }
}

fn down_port(port: &v1beta1::PortOpts) -> v1alpha7::PortOpts {
    v1alpha7::PortOpts {
        network: port.network.as_ref().map(|n| v1alpha7::NetworkFilter {
            id: n.id.clone().unwrap_or_default(),
            name: n
                .filter
                .as_ref()
                .and_then(|f| f.name.clone())
                .unwrap_or_default(),
        }),
        name_suffix: port.name_suffix.clone().unwrap_or_default(),
        description: port.description.clone().unwrap_or_default(),
        fixed_ips: port.fixed_ips.clone(),
        security_groups: port.security_groups.iter().map(down_security_group).collect(),
        tags: port.tags.clone(),
        trunk: port.trunk,
        vnic_type: port.vnic_type.clone().unwrap_or_default(),
        profile: down_binding_profile(port.profile.as_ref()),
        disable_port_security: port.disable_port_security,
    }
}

fn down_security_group(param: &v1beta1::SecurityGroupParam) -> v1alpha7::SecurityGroupFilter {
    let filter = param.filter.clone().unwrap_or_default();
    v1alpha7::SecurityGroupFilter {
        id: param.id.clone().unwrap_or_default(),
        name: filter.name,
        description: filter.description,
        project_id: filter.project_id,
        tags: filter.tags.join(","),
    }
}

fn down_binding_profile(profile: Option<&v1beta1::BindingProfile>) -> BTreeMap<String, String> {
    let mut converted = BTreeMap::new();
    let Some(profile) = profile else {
        return converted;
    };
    if profile.ovs_hw_offload == Some(true) {
        converted.insert(
            PROFILE_CAPABILITIES.to_string(),
            format!("[\"{}\"]", PROFILE_SWITCHDEV),
        );
    }
    if profile.trusted_vf == Some(true) {
        converted.insert(PROFILE_TRUSTED.to_string(), "true".to_string());
    }
    converted
}

fn down_status(status: &v1beta1::OpenStackMachineStatus) -> v1alpha7::OpenStackMachineStatus {
    // Dependent and referenced resources have no equivalent in v1alpha7
    v1alpha7::OpenStackMachineStatus {
        ready: status.ready,
        instance_id: status.instance_id.clone(),
        instance_state: status.instance_state.clone(),
        failure_reason: status.failure_reason.clone(),
        failure_message: status.failure_message.clone(),
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_SERVER_METADATA_LENGTH).collect()
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        let long = "é".repeat(300);
        let truncated = truncate(&long);
        assert_eq!(truncated.chars().count(), MAX_SERVER_METADATA_LENGTH);
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn test_split_tags_ignores_blanks() {
        assert_eq!(split_tags("a, b,,c"), vec!["a", "b", "c"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn test_binding_profile_flags() {
        let mut profile = BTreeMap::new();
        profile.insert(PROFILE_CAPABILITIES.to_string(), "[\"switchdev\"]".to_string());
        profile.insert(PROFILE_TRUSTED.to_string(), "true".to_string());
        profile.insert("pci_slot".to_string(), "0000:00:1f.0".to_string());

        let converted = up_binding_profile(&profile).unwrap();
        assert_eq!(converted.ovs_hw_offload, Some(true));
        assert_eq!(converted.trusted_vf, Some(true));

        let back = down_binding_profile(Some(&converted));
        assert_eq!(back.len(), 2);
        assert!(!back.contains_key("pci_slot"));
    }

    #[test]
    fn test_image_id_takes_precedence_over_name() {
        let spec = v1alpha7::OpenStackMachineSpec {
            image: "ubuntu".to_string(),
            image_uuid: "ce96e584".to_string(),
            ..Default::default()
        };
        let converted = up_spec(&spec);
        assert_eq!(converted.image.id.as_deref(), Some("ce96e584"));
        assert!(converted.image.filter.is_none());
    }
}
