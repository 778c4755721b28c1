//! Request and response bodies of the Compute Engine v1 API, limited to the fields the harness
//! reads or writes.

use profiler_e2e_core::prelude::InstanceSpec;
use serde::{Deserialize, Serialize};

/// Scope granted to the instance's service account so the agent can upload profiles.
pub(crate) const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Image {
    pub(crate) self_link: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SerialPortOutput {
    #[serde(default)]
    pub(crate) contents: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Instance {
    name: String,
    machine_type: String,
    disks: Vec<AttachedDisk>,
    network_interfaces: Vec<NetworkInterface>,
    metadata: Metadata,
    service_accounts: Vec<ServiceAccount>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct AttachedDisk {
    boot: bool,
    /// Delete the disk together with the instance.
    auto_delete: bool,
    #[serde(rename = "type")]
    kind: &'static str,
    mode: &'static str,
    initialize_params: InitializeParams,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    source_image: String,
    disk_type: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    network: String,
    access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Serialize, PartialEq)]
struct AccessConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
struct Metadata {
    items: Vec<MetadataItem>,
}

#[derive(Debug, Serialize, PartialEq)]
struct MetadataItem {
    key: &'static str,
    value: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct ServiceAccount {
    email: &'static str,
    scopes: Vec<&'static str>,
}

impl Instance {
    /// The insert request for `spec`, booting from the image at `source_image`.
    pub(crate) fn from_spec(spec: &InstanceSpec, source_image: &str) -> Self {
        Self {
            name: spec.name.clone(),
            machine_type: format!("zones/{}/machineTypes/{}", spec.zone, spec.machine_type),
            disks: vec![AttachedDisk {
                boot: true,
                auto_delete: true,
                kind: "PERSISTENT",
                mode: "READ_WRITE",
                initialize_params: InitializeParams {
                    source_image: source_image.to_string(),
                    disk_type: format!("zones/{}/diskTypes/pd-standard", spec.zone),
                },
            }],
            network_interfaces: vec![NetworkInterface {
                network: format!("projects/{}/global/networks/default", spec.project),
                access_configs: vec![AccessConfig {
                    kind: "ONE_TO_ONE_NAT",
                    name: "External NAT",
                }],
            }],
            metadata: Metadata {
                items: vec![MetadataItem {
                    key: "startup-script",
                    value: spec.startup_script.clone(),
                }],
            },
            service_accounts: vec![ServiceAccount {
                email: "default",
                scopes: vec![CLOUD_PLATFORM_SCOPE],
            }],
        }
    }
}
