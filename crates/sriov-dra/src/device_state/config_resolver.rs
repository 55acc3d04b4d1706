//! Tiered resolution of opaque VfConfig parameters per request
//!
//! Class-tier configs (from the DeviceClass) are applied before claim-tier
//! configs (from the ResourceClaim), each tier in input order. Every applied
//! config overlays only the fields it sets.

use std::collections::BTreeMap;
use std::str::FromStr;

use api_types::DeviceAllocationConfiguration;
use api_types::VfConfig;
use api_types::ALLOCATION_CONFIG_SOURCE_CLAIM;
use api_types::ALLOCATION_CONFIG_SOURCE_CLASS;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("only opaque parameters are supported by this driver")]
    NotOpaque,

    #[error("error decoding config parameters: {0}")]
    Decode(String),

    #[error("invalid config source: {0}")]
    InvalidSource(String),

    #[error("no configs constructed for driver")]
    NoConfigs,
}

/// Precedence tier of a configuration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTier {
    Class,
    Claim,
}

impl FromStr for ConfigTier {
    type Err = ConfigError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        match source {
            ALLOCATION_CONFIG_SOURCE_CLASS | "class" => Ok(Self::Class),
            ALLOCATION_CONFIG_SOURCE_CLAIM | "claim" => Ok(Self::Claim),
            other => Err(ConfigError::InvalidSource(other.to_string())),
        }
    }
}

/// A decoded config together with the requests it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueDeviceConfig {
    pub tier: ConfigTier,
    pub requests: Vec<String>,
    pub config: VfConfig,
}

/// Decode the entries addressed to `driver_name`, keeping input order.
pub fn decode_opaque_configs(
    driver_name: &str,
    entries: &[DeviceAllocationConfiguration],
) -> Result<Vec<OpaqueDeviceConfig>, ConfigError> {
    let mut decoded = Vec::new();

    for entry in entries {
        let Some(opaque) = &entry.opaque else {
            return Err(ConfigError::NotOpaque);
        };
        if opaque.driver != driver_name {
            continue;
        }
        let config = VfConfig::decode(opaque.parameters.as_bytes())
            .map_err(|e| ConfigError::Decode(e.to_string()))?;
        let tier = entry.source.parse::<ConfigTier>()?;

        decoded.push(OpaqueDeviceConfig {
            tier,
            requests: entry.requests.clone(),
            config,
        });
    }

    Ok(decoded)
}

/// Merge the entries addressed to `driver_name` into one config per request.
pub fn resolve(
    driver_name: &str,
    entries: &[DeviceAllocationConfiguration],
) -> Result<BTreeMap<String, VfConfig>, ConfigError> {
    let decoded = decode_opaque_configs(driver_name, entries)?;

    let mut resolved: BTreeMap<String, VfConfig> = BTreeMap::new();
    for tier in [ConfigTier::Class, ConfigTier::Claim] {
        for opaque in decoded.iter().filter(|c| c.tier == tier) {
            for request in &opaque.requests {
                resolved
                    .entry(request.clone())
                    .or_default()
                    .merge_from(&opaque.config);
            }
        }
    }

    if resolved.is_empty() {
        return Err(ConfigError::NoConfigs);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use api_types::OpaqueDeviceConfiguration;
    use api_types::VF_CONFIG_API_VERSION;
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::consts::DRIVER_NAME;

    fn entry(
        source: &str,
        requests: &[&str],
        params: serde_json::Value,
    ) -> DeviceAllocationConfiguration {
        entry_for_driver(DRIVER_NAME, source, requests, params)
    }

    fn entry_for_driver(
        driver: &str,
        source: &str,
        requests: &[&str],
        mut params: serde_json::Value,
    ) -> DeviceAllocationConfiguration {
        if let Some(obj) = params.as_object_mut() {
            obj.entry("apiVersion").or_insert(VF_CONFIG_API_VERSION.into());
            obj.entry("kind").or_insert("VfConfig".into());
        }
        DeviceAllocationConfiguration {
            source: source.to_string(),
            requests: requests.iter().map(|r| r.to_string()).collect(),
            opaque: Some(OpaqueDeviceConfiguration {
                driver: driver.to_string(),
                parameters: serde_json::to_vec(&params).unwrap().into(),
            }),
        }
    }

    #[test]
    fn claim_tier_wins_over_class_tier_in_any_order() {
        let class = entry(
            "FromClass",
            &["r1"],
            json!({"driver": "vfio-pci", "netAttachDefName": "n1"}),
        );
        let claim = entry("FromClaim", &["r1"], json!({"netAttachDefName": "n2"}));

        for entries in [vec![class.clone(), claim.clone()], vec![claim, class]] {
            let resolved = resolve(DRIVER_NAME, &entries).unwrap();
            assert_eq!(resolved["r1"].driver, "vfio-pci");
            assert_eq!(resolved["r1"].net_attach_def_name, "n2");
        }
    }

    #[test]
    fn later_entry_in_same_tier_overrides_only_set_fields() {
        let entries = vec![
            entry(
                "FromClaim",
                &["r1"],
                json!({"driver": "netdevice", "netAttachDefName": "n1", "ifName": "net9"}),
            ),
            entry("FromClaim", &["r1"], json!({"driver": "vfio-pci"})),
        ];

        let resolved = resolve(DRIVER_NAME, &entries).unwrap();

        assert_eq!(resolved["r1"].driver, "vfio-pci");
        assert_eq!(resolved["r1"].net_attach_def_name, "n1");
        assert_eq!(resolved["r1"].if_name, "net9");
    }

    #[test]
    fn lowercase_tier_names_are_accepted() {
        let entries = vec![
            entry("claim", &["r1"], json!({"netAttachDefName": "n2"})),
            entry(
                "class",
                &["r1"],
                json!({"netAttachDefName": "n1", "driver": "vfio-pci"}),
            ),
        ];

        let resolved = resolve(DRIVER_NAME, &entries).unwrap();

        assert_eq!(resolved["r1"], VfConfig::new("vfio-pci", "n2"));
    }

    #[test]
    fn multiple_requests_are_resolved_independently() {
        let entries = vec![
            entry(
                "FromClass",
                &["req1", "req2"],
                json!({"driver": "netdevice", "netAttachDefName": "base"}),
            ),
            entry("FromClaim", &["req2", "req3"], json!({"netAttachDefName": "special"})),
        ];

        let resolved = resolve(DRIVER_NAME, &entries).unwrap();

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved["req1"].net_attach_def_name, "base");
        assert_eq!(resolved["req2"].net_attach_def_name, "special");
        assert_eq!(resolved["req2"].driver, "netdevice");
        assert_eq!(resolved["req3"].driver, "");
    }

    #[test]
    fn other_drivers_are_skipped() {
        let entries = vec![
            entry_for_driver(
                "gpu.example.com",
                "FromClaim",
                &["r1"],
                json!({"driver": "nvidia"}),
            ),
            entry("FromClaim", &["r2"], json!({"netAttachDefName": "n2"})),
        ];

        let resolved = resolve(DRIVER_NAME, &entries).unwrap();

        assert_eq!(resolved.keys().collect::<Vec<_>>(), vec!["r2"]);
    }

    #[test]
    fn nothing_for_this_driver_is_an_error() {
        assert_eq!(resolve(DRIVER_NAME, &[]), Err(ConfigError::NoConfigs));

        let foreign = vec![entry_for_driver(
            "other.driver.com",
            "FromClass",
            &["r1"],
            json!({}),
        )];
        assert_eq!(resolve(DRIVER_NAME, &foreign), Err(ConfigError::NoConfigs));

        let no_requests = vec![entry("FromClass", &[], json!({"driver": "vfio-pci"}))];
        let err = resolve(DRIVER_NAME, &no_requests).unwrap_err();
        assert_eq!(err.to_string(), "no configs constructed for driver");
    }

    #[test]
    fn invalid_source_is_rejected() {
        let entries = vec![entry("InvalidSource", &["r1"], json!({}))];

        let err = resolve(DRIVER_NAME, &entries).unwrap_err();

        assert_eq!(err.to_string(), "invalid config source: InvalidSource");
    }

    #[test]
    fn missing_opaque_payload_is_rejected() {
        let entries = vec![DeviceAllocationConfiguration {
            source: "FromClass".to_string(),
            requests: vec!["r1".to_string()],
            opaque: None,
        }];

        let err = resolve(DRIVER_NAME, &entries).unwrap_err();

        assert_eq!(err.to_string(), "only opaque parameters are supported by this driver");
    }

    #[test]
    fn undecodable_payloads_are_rejected() {
        let garbage = DeviceAllocationConfiguration {
            source: "FromClass".to_string(),
            requests: vec!["r1".to_string()],
            opaque: Some(OpaqueDeviceConfiguration {
                driver: DRIVER_NAME.to_string(),
                parameters: "\"invalid json\"".into(),
            }),
        };
        let wrong_kind = entry(
            "FromClass",
            &["r1"],
            json!({"apiVersion": "v1", "kind": "Pod"}),
        );

        for entries in [vec![garbage], vec![wrong_kind]] {
            let err = resolve(DRIVER_NAME, &entries).unwrap_err();
            assert!(
                err.to_string().starts_with("error decoding config parameters: "),
                "unexpected error: {err}"
            );
        }
    }
}
