//! Core state types shared by the device state manager and the checkpoint
//!
//! All maps are ordered so that serializing the same state always yields the
//! same bytes, which the checkpoint checksum relies on.

use std::collections::BTreeMap;

use api_types::NetworkDeviceData;
use api_types::VfConfig;
use serde::Deserialize;
use serde::Serialize;

use crate::cdi::ContainerEdits;

/// One SR-IOV virtual function known on this node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatableDevice {
    /// DRA device name published in the ResourceSlice.
    pub name: String,
    pub pci_address: String,
    pub vendor_id: String,
    pub device_id: String,
    pub pf_name: String,
    /// PCI address of the parent physical function.
    pub parent_pci_address: String,
    pub vf_id: u32,
    pub numa_node: Option<i32>,
    /// Kernel driver the VF is bound to right now.
    pub driver: String,
    #[serde(default)]
    pub resource_name: String,
}

/// Devices keyed by PCI address.
pub type AllocatableDevices = BTreeMap<String, AllocatableDevice>;

/// Device descriptor handed back to the kubelet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub request_names: Vec<String>,
    pub pool_name: String,
    pub device_name: String,
    #[serde(rename = "cdiDeviceIDs")]
    pub cdi_device_ids: Vec<String>,
}

/// Namespaced identity of a ResourceClaim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacedObject {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

/// One VF bound to one claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedDevice {
    pub device: Device,
    pub claim_namespaced_name: NamespacedObject,
    pub container_edits: ContainerEdits,
    pub config: VfConfig,
    pub if_name: String,
    pub pci_address: String,
    #[serde(rename = "podUID")]
    pub pod_uid: String,
    /// Netconf handed to the network plugin, with deviceID (and mac) injected.
    pub net_attach_def_config: String,
    /// Driver to restore on release.
    pub original_driver: String,
    /// Set once network setup ran; a device carrying it is never set up again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_data: Option<NetworkDeviceData>,
}

impl PreparedDevice {
    /// Key of this device in the per-pod result file.
    pub fn result_key(&self) -> String {
        let request = self
            .device
            .request_names
            .first()
            .map(String::as_str)
            .unwrap_or_default();
        format!("{}/{}", self.claim_namespaced_name.name, request)
    }
}

pub type PreparedDevices = Vec<PreparedDevice>;

/// Claim UID to its prepared devices.
pub type PreparedDevicesByClaimID = BTreeMap<String, PreparedDevices>;

/// Pod UID to the claims prepared for it.
pub type PreparedClaimsByPodUID = BTreeMap<String, PreparedDevicesByClaimID>;

/// Outcome of a network plugin ADD for one device.
///
/// Pairs the device with what the plugin reported so callers can record and
/// publish the result without invoking the plugin again.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceNetworkData {
    pub prepared_device: PreparedDevice,
    pub network_data: NetworkDeviceData,
    pub cni_config: serde_json::Value,
    pub cni_result: serde_json::Value,
}
