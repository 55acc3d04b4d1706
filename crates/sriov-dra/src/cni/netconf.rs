//! Network configuration documents handed to CNI plugins

use serde_json::Map;
use serde_json::Value;

use super::error::CniError;

const DEFAULT_CNI_VERSION: &str = "1.0.0";

type JsonObject = Map<String, Value>;

/// A network configuration normalized to a plugin chain.
///
/// A single plugin config becomes a chain of one.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfigList {
    pub name: String,
    pub cni_version: String,
    pub plugins: Vec<JsonObject>,
}

impl NetworkConfigList {
    pub fn parse(netconf: &str) -> Result<Self, CniError> {
        let root = parse_object(netconf)?;
        let name = string_field(&root, "name").unwrap_or_default();
        let cni_version = string_field(&root, "cniVersion")
            .unwrap_or_else(|| DEFAULT_CNI_VERSION.to_string());

        let plugins = match root.get("plugins").cloned() {
            Some(Value::Array(plugins)) => plugins
                .into_iter()
                .map(|plugin| match plugin {
                    Value::Object(obj) => Ok(obj),
                    _ => Err(CniError::InvalidConfig(
                        "plugins entries must be objects".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(CniError::InvalidConfig(
                    "plugins must be an array".to_string(),
                ))
            }
            None => vec![root],
        };

        if plugins.is_empty() {
            return Err(CniError::InvalidConfig("no plugins in config list".to_string()));
        }
        for plugin in &plugins {
            if string_field(plugin, "type").unwrap_or_default().is_empty() {
                return Err(CniError::InvalidConfig("plugin config has no type".to_string()));
            }
        }

        Ok(Self {
            name,
            cni_version,
            plugins,
        })
    }

    pub fn plugin_type(&self, index: usize) -> &str {
        self.plugins
            .get(index)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Stdin for plugin `index`, with the chain's name and version injected and
    /// the previous plugin's result as `prevResult`.
    pub fn plugin_config(
        &self,
        index: usize,
        prev_result: Option<&Value>,
    ) -> Result<Vec<u8>, CniError> {
        let mut plugin = self
            .plugins
            .get(index)
            .cloned()
            .ok_or_else(|| CniError::InvalidConfig(format!("no plugin at index {index}")))?;

        plugin.insert("name".to_string(), Value::String(self.name.clone()));
        plugin.insert("cniVersion".to_string(), Value::String(self.cni_version.clone()));
        match prev_result {
            Some(result) => {
                plugin.insert("prevResult".to_string(), result.clone());
            }
            None => {
                plugin.remove("prevResult");
            }
        }

        serde_json::to_vec(&plugin).map_err(|e| CniError::InvalidConfig(e.to_string()))
    }
}

/// Set `deviceID` on the config, or on the first plugin of a config list.
pub fn add_device_id_to_netconf(netconf: &str, device_id: &str) -> Result<String, CniError> {
    set_device_field(netconf, "deviceID", device_id)
}

/// Set `mac` on the config, or on the first plugin of a config list.
pub fn add_mac_to_netconf(netconf: &str, mac: &str) -> Result<String, CniError> {
    set_device_field(netconf, "mac", mac)
}

fn set_device_field(netconf: &str, key: &str, value: &str) -> Result<String, CniError> {
    let mut root = parse_object(netconf)?;
    let target = if root.contains_key("plugins") {
        match root.get_mut("plugins") {
            Some(Value::Array(plugins)) => match plugins.first_mut() {
                Some(Value::Object(first)) => first,
                _ => {
                    return Err(CniError::InvalidConfig(
                        "config list has no plugin object".to_string(),
                    ))
                }
            },
            _ => return Err(CniError::InvalidConfig("plugins must be an array".to_string())),
        }
    } else {
        &mut root
    };
    target.insert(key.to_string(), Value::String(value.to_string()));

    serde_json::to_string(&root).map_err(|e| CniError::InvalidConfig(e.to_string()))
}

fn parse_object(netconf: &str) -> Result<JsonObject, CniError> {
    match serde_json::from_str::<Value>(netconf) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(_) => Err(CniError::InvalidConfig("netconf is not a JSON object".to_string())),
        Err(e) => Err(CniError::InvalidConfig(format!("failed to parse netconf: {e}"))),
    }
}

fn string_field(obj: &JsonObject, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    const SINGLE: &str = r#"{"cniVersion":"1.0.0","name":"sriov-net","type":"sriov","vlan":100}"#;
    const LIST: &str = r#"{
        "cniVersion": "0.4.0",
        "name": "chain",
        "plugins": [
            {"type": "sriov", "ipam": {"type": "host-local"}},
            {"type": "tuning", "sysctl": {}}
        ]
    }"#;

    #[test]
    fn device_id_and_mac_are_injected_into_single_config() {
        let with_id = add_device_id_to_netconf(SINGLE, "0000:3b:02.0").unwrap();
        let with_mac = add_mac_to_netconf(&with_id, "02:00:00:00:00:01").unwrap();
        let value: Value = serde_json::from_str(&with_mac).unwrap();

        assert_eq!(value["deviceID"], "0000:3b:02.0");
        assert_eq!(value["mac"], "02:00:00:00:00:01");
        assert_eq!(value["vlan"], 100);
    }

    #[test]
    fn device_id_goes_to_first_plugin_of_list() {
        let updated = add_device_id_to_netconf(LIST, "0000:3b:02.0").unwrap();
        let value: Value = serde_json::from_str(&updated).unwrap();

        assert_eq!(value["plugins"][0]["deviceID"], "0000:3b:02.0");
        assert!(value["plugins"][1].get("deviceID").is_none());
        assert!(value.get("deviceID").is_none());
    }

    #[test]
    fn invalid_netconf_is_rejected() {
        assert!(matches!(
            add_device_id_to_netconf("not json", "x"),
            Err(CniError::InvalidConfig(_))
        ));
        assert!(matches!(
            NetworkConfigList::parse(r#"{"name":"no-type"}"#),
            Err(CniError::InvalidConfig(_))
        ));
    }

    #[test]
    fn list_plugins_inherit_name_version_and_prev_result() {
        let list = NetworkConfigList::parse(LIST).unwrap();
        let prev = serde_json::json!({"cniVersion": "0.4.0", "ips": []});

        let stdin = list.plugin_config(1, Some(&prev)).unwrap();
        let second: Value = serde_json::from_slice(&stdin).unwrap();

        assert_eq!(list.plugins.len(), 2);
        assert_eq!(list.plugin_type(1), "tuning");
        assert_eq!(second["name"], "chain");
        assert_eq!(second["cniVersion"], "0.4.0");
        assert_eq!(second["prevResult"], prev);
    }

    #[test]
    fn single_config_is_a_chain_of_one() {
        let list = NetworkConfigList::parse(SINGLE).unwrap();
        let first: Value = serde_json::from_slice(&list.plugin_config(0, None).unwrap()).unwrap();

        assert_eq!(list.name, "sriov-net");
        assert_eq!(list.plugin_type(0), "sriov");
        assert_eq!(first["vlan"], 100);
        assert!(first.get("prevResult").is_none());
    }
}
