//! Per-device network setup through the CNI exec protocol

use std::path::PathBuf;

use serde_json::Value;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use super::backoff::retry_with_backoff;
use super::backoff::Backoff;
use super::error::CniCommand;
use super::error::CniError;
use super::error::PluginFailure;
use super::exec::PluginExec;
use super::netconf::NetworkConfigList;
use super::status::network_data_from_result;
use super::status::CniResult;
use crate::types::DeviceNetworkData;
use crate::types::PreparedDevice;

/// Identity of one attachment as passed in the CNI environment.
#[derive(Debug, Clone, Copy)]
struct RuntimeConf<'a> {
    container_id: &'a str,
    netns: &'a str,
    if_name: &'a str,
    pod_namespace: &'a str,
}

pub struct CniRuntime<E> {
    exec: E,
    bin_dirs: Vec<PathBuf>,
    backoff: Backoff,
}

impl<E: PluginExec> CniRuntime<E> {
    pub fn new(exec: E, bin_dirs: Vec<PathBuf>) -> Self {
        Self {
            exec,
            bin_dirs,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run ADD for `device` inside `netns`, retrying transient failures.
    ///
    /// If the call is cancelled or every attempt failed, a best-effort DEL
    /// is issued so no half-configured attachment is left behind.
    #[tracing::instrument(skip_all, fields(pci_address = %device.pci_address, pod_uid = %device.pod_uid))]
    pub async fn attach(
        &self,
        device: &PreparedDevice,
        netns: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<DeviceNetworkData, CniError> {
        let list = NetworkConfigList::parse(&device.net_attach_def_config)?;
        let rt = runtime_conf(device, netns);

        let outcome = select! {
            _ = cancellation_token.cancelled() => Err(CniError::Cancelled),
            result = retry_with_backoff(&self.backoff, "ADD", || self.add_network_list(&list, rt)) => result,
        };

        let (result, parsed) = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Err(del_err) = self.del_network_list(&list, rt).await {
                    warn!("Cleanup DEL after failed ADD also failed: {del_err}");
                }
                return Err(err);
            }
        };

        let network_data = network_data_from_result(&parsed);
        info!(
            interface = %network_data.interface_name,
            ips = ?network_data.ips,
            "Network attached"
        );

        let mut prepared_device = device.clone();
        prepared_device.network_data = Some(network_data.clone());

        Ok(DeviceNetworkData {
            prepared_device,
            network_data,
            cni_config: serde_json::from_str(&device.net_attach_def_config)
                .unwrap_or(Value::Null),
            cni_result: result,
        })
    }

    /// Run DEL for `device`, last plugin of the chain first.
    #[tracing::instrument(skip_all, fields(pci_address = %device.pci_address, pod_uid = %device.pod_uid))]
    pub async fn detach(&self, device: &PreparedDevice, netns: &str) -> Result<(), CniError> {
        let list = NetworkConfigList::parse(&device.net_attach_def_config)?;
        self.del_network_list(&list, runtime_conf(device, netns)).await
    }

    /// Run ADD through the chain; the last plugin's output must be a typed result.
    async fn add_network_list(
        &self,
        list: &NetworkConfigList,
        rt: RuntimeConf<'_>,
    ) -> Result<(Value, CniResult), CniError> {
        let mut prev_result: Option<Value> = None;
        for index in 0..list.plugins.len() {
            let stdin = list.plugin_config(index, prev_result.as_ref())?;
            let stdout = self
                .invoke(CniCommand::Add, list.plugin_type(index), &stdin, rt)
                .await?;
            let result = serde_json::from_slice::<Value>(&stdout).map_err(|e| {
                CniError::MalformedResult {
                    command: CniCommand::Add,
                    plugin: list.plugin_type(index).to_string(),
                    message: e.to_string(),
                }
            })?;
            prev_result = Some(result);
        }

        let result = prev_result
            .ok_or_else(|| CniError::InvalidConfig("no plugins in config list".to_string()))?;
        let parsed: CniResult =
            serde_json::from_value(result.clone()).map_err(|e| CniError::MalformedResult {
                command: CniCommand::Add,
                plugin: list.name.clone(),
                message: e.to_string(),
            })?;
        Ok((result, parsed))
    }

    async fn del_network_list(
        &self,
        list: &NetworkConfigList,
        rt: RuntimeConf<'_>,
    ) -> Result<(), CniError> {
        for index in (0..list.plugins.len()).rev() {
            let stdin = list.plugin_config(index, None)?;
            self.invoke(CniCommand::Del, list.plugin_type(index), &stdin, rt)
                .await?;
        }
        Ok(())
    }

    async fn invoke(
        &self,
        command: CniCommand,
        plugin: &str,
        stdin: &[u8],
        rt: RuntimeConf<'_>,
    ) -> Result<Vec<u8>, CniError> {
        let plugin_path = self.exec.find_in_path(plugin, &self.bin_dirs)?;
        let env = self.environment(command, rt);

        let output = self
            .exec
            .exec_plugin(&plugin_path, stdin, &env)
            .await
            .map_err(|source| CniError::Exec {
                command,
                plugin: plugin.to_string(),
                source,
            })?;

        if !output.success {
            return Err(CniError::Plugin {
                command,
                plugin: plugin.to_string(),
                failure: PluginFailure::from_output(&output.stdout, &output.stderr),
            });
        }
        Ok(output.stdout)
    }

    fn environment(&self, command: CniCommand, rt: RuntimeConf<'_>) -> Vec<(String, String)> {
        let cni_path = self
            .bin_dirs
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        let cni_args = format!(
            "IgnoreUnknown=true;K8S_POD_NAMESPACE={};K8S_POD_UID={}",
            rt.pod_namespace, rt.container_id
        );

        vec![
            ("CNI_COMMAND".to_string(), command.to_string()),
            ("CNI_CONTAINERID".to_string(), rt.container_id.to_string()),
            ("CNI_NETNS".to_string(), rt.netns.to_string()),
            ("CNI_IFNAME".to_string(), rt.if_name.to_string()),
            ("CNI_ARGS".to_string(), cni_args),
            ("CNI_PATH".to_string(), cni_path),
        ]
    }
}

fn runtime_conf<'a>(device: &'a PreparedDevice, netns: &'a str) -> RuntimeConf<'a> {
    RuntimeConf {
        container_id: &device.pod_uid,
        netns,
        if_name: &device.if_name,
        pod_namespace: &device.claim_namespaced_name.namespace,
    }
}
