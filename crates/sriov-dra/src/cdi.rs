//! Container edits injected through CDI for each prepared VF

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::PCI_ADDRESS_ENV_PREFIX;

/// CDI vendor/class the driver registers its devices under.
pub const CDI_KIND: &str = "k8s.sriovnetwork.openshift.io/vf";

const VFIO_DEVICE_DIR: &str = "/dev/vfio";
const VFIO_CONTAINER_DEVICE: &str = "/dev/vfio/vfio";
const VHOST_NET_DEVICE: &str = "/dev/vhost-net";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEdits {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_nodes: Vec<DeviceNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNode {
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub permissions: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub host_path: String,
    pub container_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Inputs for the edits of a single VF.
#[derive(Debug)]
pub struct VfEditsRequest<'a> {
    pub request_name: &'a str,
    pub pci_address: &'a str,
    /// IOMMU group, set when the VF is bound to vfio-pci.
    pub iommu_group: Option<&'a str>,
    pub add_vhost_mount: bool,
    pub host_result_file: &'a Path,
    pub container_result_file: &'a Path,
}

/// Fully qualified CDI device ID of a prepared VF.
pub fn cdi_device_id(claim_uid: &str, pci_address: &str) -> String {
    format!("{CDI_KIND}={claim_uid}-{}", pci_address.replace([':', '.'], "-"))
}

/// Build the edits injecting one VF into a container.
pub fn vf_container_edits(request: &VfEditsRequest<'_>) -> ContainerEdits {
    let mut edits = ContainerEdits {
        env: vec![format!(
            "{PCI_ADDRESS_ENV_PREFIX}_{}={}",
            env_suffix(request.request_name),
            request.pci_address
        )],
        mounts: vec![Mount {
            host_path: request.host_result_file.display().to_string(),
            container_path: request.container_result_file.display().to_string(),
            options: vec!["ro".to_string(), "bind".to_string()],
        }],
        ..Default::default()
    };

    if let Some(group) = request.iommu_group {
        edits.device_nodes.push(DeviceNode {
            path: VFIO_CONTAINER_DEVICE.to_string(),
            ..Default::default()
        });
        edits.device_nodes.push(DeviceNode {
            path: format!("{VFIO_DEVICE_DIR}/{group}"),
            ..Default::default()
        });
    }

    if request.add_vhost_mount {
        edits.device_nodes.push(DeviceNode {
            path: VHOST_NET_DEVICE.to_string(),
            permissions: "rw".to_string(),
            ..Default::default()
        });
    }

    edits
}

fn env_suffix(request_name: &str) -> String {
    request_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
