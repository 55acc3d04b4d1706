//! Subset of the `resource.k8s.io` types consumed by the driver
//!
//! Only the fields the kubelet plugin reads from an allocated ResourceClaim are
//! modelled here; field names follow the upstream JSON representation.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Configuration source for configs copied from the DeviceClass.
pub const ALLOCATION_CONFIG_SOURCE_CLASS: &str = "FromClass";
/// Configuration source for configs supplied in the ResourceClaim itself.
pub const ALLOCATION_CONFIG_SOURCE_CLAIM: &str = "FromClaim";

/// An allocated ResourceClaim as handed to the kubelet plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClaim {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    /// Consumers the claim is reserved for; the owning pod is one of them.
    #[serde(default)]
    pub reserved_for: Vec<ResourceClaimConsumerReference>,
    #[serde(default)]
    pub allocation: Option<AllocationResult>,
}

impl ResourceClaim {
    /// The first pod that reserved this claim.
    pub fn pod_reference(&self) -> Option<&ResourceClaimConsumerReference> {
        self.reserved_for
            .iter()
            .find(|consumer| consumer.api_group.is_empty() && consumer.resource == "pods")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClaimConsumerReference {
    #[serde(default)]
    pub api_group: String,
    pub resource: String,
    pub name: String,
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    #[serde(default)]
    pub devices: DeviceAllocationResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAllocationResult {
    #[serde(default)]
    pub results: Vec<DeviceRequestAllocationResult>,
    #[serde(default)]
    pub config: Vec<DeviceAllocationConfiguration>,
}

/// One device picked by the scheduler for one request of the claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequestAllocationResult {
    pub request: String,
    pub driver: String,
    pub pool: String,
    pub device: String,
}

/// Configuration attached to an allocation, tagged with where it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAllocationConfiguration {
    /// Either [`ALLOCATION_CONFIG_SOURCE_CLASS`] or [`ALLOCATION_CONFIG_SOURCE_CLAIM`].
    pub source: String,
    /// Requests the config applies to.
    #[serde(default)]
    pub requests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opaque: Option<OpaqueDeviceConfiguration>,
}

/// Driver-specific parameters in an opaque, driver-tagged envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpaqueDeviceConfiguration {
    pub driver: String,
    pub parameters: RawExtension,
}

/// Raw, not yet decoded JSON document.
///
/// On the wire this is an embedded JSON value; in memory it keeps the bytes so
/// that decoding (and its failure) is left to the driver owning the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExtension(pub Vec<u8>);

impl RawExtension {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for RawExtension {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for RawExtension {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl Serialize for RawExtension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value: serde_json::Value =
            serde_json::from_slice(&self.0).map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawExtension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        serde_json::to_vec(&value)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Network details of a prepared device, published in the claim status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeviceData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hardware_address: String,
}
