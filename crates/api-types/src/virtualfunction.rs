//! `sriovnetwork.k8snetworkplumbingwg.io/v1alpha1` VfConfig

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// API group/version of the opaque device configuration.
pub const VF_CONFIG_API_VERSION: &str = "sriovnetwork.k8snetworkplumbingwg.io/v1alpha1";
/// Kind of the opaque device configuration.
pub const VF_CONFIG_KIND: &str = "VfConfig";

/// Driver value meaning "keep the VF on its kernel network driver".
pub const NETDEVICE_DRIVER: &str = "netdevice";

/// Per-request configuration of a virtual function.
///
/// Every field is optional on the wire. An empty string (or `false`) means
/// "not set" so that several configs can be layered on top of each other with
/// [`VfConfig::merge_from`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VfConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Kernel driver the VF is bound to before handing it to the container,
    /// e.g. `vfio-pci`, or `netdevice` to keep the current network driver.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub driver: String,
    /// NetworkAttachmentDefinition holding the CNI config, `name` or `namespace/name`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub net_attach_def_name: String,
    /// Interface name inside the pod network namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub if_name: String,
    /// Also inject `/dev/vhost-net` into the container.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub add_vhost_mount: bool,
}

/// Errors produced while decoding or validating a [`VfConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VfConfigError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected object {kind:?} in {api_version:?}, want VfConfig")]
    UnexpectedKind { api_version: String, kind: String },

    #[error("no driver set")]
    NoDriver,

    #[error("no net attach def name set")]
    NoNetAttachDefName,
}

impl VfConfig {
    /// Build a fully typed config with the given driver and network attachment.
    pub fn new(driver: impl Into<String>, net_attach_def_name: impl Into<String>) -> Self {
        Self {
            api_version: VF_CONFIG_API_VERSION.to_string(),
            kind: VF_CONFIG_KIND.to_string(),
            driver: driver.into(),
            net_attach_def_name: net_attach_def_name.into(),
            ..Default::default()
        }
    }

    /// Strictly decode raw opaque parameters.
    ///
    /// Unknown fields are rejected and the `apiVersion`/`kind` pair must name
    /// this type.
    pub fn decode(raw: &[u8]) -> Result<Self, VfConfigError> {
        let config: VfConfig =
            serde_json::from_slice(raw).map_err(|e| VfConfigError::InvalidJson(e.to_string()))?;

        if config.api_version != VF_CONFIG_API_VERSION || config.kind != VF_CONFIG_KIND {
            return Err(VfConfigError::UnexpectedKind {
                api_version: config.api_version,
                kind: config.kind,
            });
        }

        Ok(config)
    }

    /// Overlay the fields `other` sets on top of `self`.
    ///
    /// Unset fields in `other` never clear a value already present in `self`.
    pub fn merge_from(&mut self, other: &VfConfig) {
        if !other.api_version.is_empty() {
            self.api_version.clone_from(&other.api_version);
        }
        if !other.kind.is_empty() {
            self.kind.clone_from(&other.kind);
        }
        if !other.driver.is_empty() {
            self.driver.clone_from(&other.driver);
        }
        if !other.net_attach_def_name.is_empty() {
            self.net_attach_def_name.clone_from(&other.net_attach_def_name);
        }
        if !other.if_name.is_empty() {
            self.if_name.clone_from(&other.if_name);
        }
        if other.add_vhost_mount {
            self.add_vhost_mount = true;
        }
    }

    /// Ensure the merged config is usable for preparing a device.
    pub fn validate(&self) -> Result<(), VfConfigError> {
        if self.driver.is_empty() {
            return Err(VfConfigError::NoDriver);
        }
        if self.net_attach_def_name.is_empty() {
            return Err(VfConfigError::NoNetAttachDefName);
        }
        Ok(())
    }

    /// Whether preparing this config rebinds the VF to another kernel driver.
    pub fn rebinds_driver(&self) -> bool {
        !self.driver.is_empty() && self.driver != NETDEVICE_DRIVER
    }

    /// Split `net_attach_def_name` into namespace and name, falling back to
    /// `default_namespace` when it is not qualified.
    pub fn net_attach_def_ref<'a>(&'a self, default_namespace: &'a str) -> (&'a str, &'a str) {
        match self.net_attach_def_name.split_once('/') {
            Some((namespace, name)) => (namespace, name),
            None => (default_namespace, self.net_attach_def_name.as_str()),
        }
    }
}
