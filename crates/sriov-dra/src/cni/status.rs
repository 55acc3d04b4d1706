//! CNI result documents and their conversion to claim network data

use api_types::NetworkDeviceData;
use serde::Deserialize;
use serde::Serialize;

/// Result printed by a plugin on a successful ADD.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CniResult {
    #[serde(default)]
    pub cni_version: String,
    #[serde(default)]
    pub interfaces: Vec<CniInterface>,
    #[serde(default)]
    pub ips: Vec<CniIpConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CniInterface {
    pub name: String,
    #[serde(default)]
    pub mac: String,
    /// Namespace path; only interfaces inside the pod carry one.
    #[serde(default)]
    pub sandbox: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CniIpConfig {
    /// `address/prefix`.
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,
}

/// Collect every IP, and the name and MAC of the pod-side interface.
pub fn network_data_from_result(result: &CniResult) -> NetworkDeviceData {
    let mut data = NetworkDeviceData {
        ips: result.ips.iter().map(|ip| ip.address.clone()).collect(),
        ..Default::default()
    };

    for interface in result.interfaces.iter().filter(|i| !i.sandbox.is_empty()) {
        data.interface_name.clone_from(&interface.name);
        data.hardware_address.clone_from(&interface.mac);
    }

    data
}
