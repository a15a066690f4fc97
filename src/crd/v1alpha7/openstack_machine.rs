//! OpenStackMachine Custom Resource Definition (v1alpha7)

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::v1beta1::FixedIp;

/// OpenStackMachine resource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha7",
    kind = "OpenStackMachine",
    plural = "openstackmachines",
    singular = "openstackmachine",
    shortname = "osm",
    namespaced,
    status = "OpenStackMachineStatus",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackMachineSpec {
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Cloud entry within the identity secret
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cloud_name: String,

    #[serde(default)]
    pub flavor: String,

    /// Image name; ignored when `imageUUID` is set
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(rename = "imageUUID", default, skip_serializing_if = "String::is_empty")]
    pub image_uuid: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortOpts>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<SecurityGroupFilter>,

    #[serde(default)]
    pub trunk: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Server metadata, unbounded key and value length
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub server_metadata: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_drive: Option<bool>,

    #[serde(rename = "serverGroupID", default, skip_serializing_if = "String::is_empty")]
    pub server_group_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<OpenStackIdentityReference>,

    /// Pre-allocated floating IP to associate
    #[serde(rename = "floatingIP", default, skip_serializing_if = "String::is_empty")]
    pub floating_ip: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackIdentityReference {
    #[serde(default)]
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupFilter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "projectID", default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,

    /// Comma separated tag list
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFilter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkFilter>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name_suffix: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "fixedIPs", default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_ips: Vec<FixedIp>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<SecurityGroupFilter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trunk: Option<bool>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vnic_type: String,

    /// Free-form binding profile passed to Neutron
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profile: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_port_security: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackMachineStatus {
    #[serde(default)]
    pub ready: bool,

    #[serde(rename = "instanceID", default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}
