//! Fakes for the host, the API server and the network plugin.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use api_types::AllocationResult;
use api_types::DeviceAllocationConfiguration;
use api_types::DeviceAllocationResult;
use api_types::DeviceRequestAllocationResult;
use api_types::OpaqueDeviceConfiguration;
use api_types::ResourceClaim;
use api_types::ResourceClaimConsumerReference;
use api_types::VfConfig;
use async_trait::async_trait;
use error_stack::Report;
use sriov_dra_driver::checkpoint::CheckpointStore;
use sriov_dra_driver::cni::Backoff;
use sriov_dra_driver::cni::CniError;
use sriov_dra_driver::cni::CniRuntime;
use sriov_dra_driver::cni::ExecOutput;
use sriov_dra_driver::cni::PluginExec;
use sriov_dra_driver::cni::ResultFiles;
use sriov_dra_driver::consts::DRIVER_NAME;
use sriov_dra_driver::device_state::DeviceStateError;
use sriov_dra_driver::device_state::DeviceStateManager;
use sriov_dra_driver::host::DeviceHost;
use sriov_dra_driver::host::HostError;
use sriov_dra_driver::k8s::ClusterLookup;
use sriov_dra_driver::k8s::KubernetesError;
use sriov_dra_driver::types::AllocatableDevice;
use sriov_dra_driver::types::AllocatableDevices;
use tempfile::TempDir;

pub const NAMESPACE: &str = "default";
pub const NETWORK: &str = "sriov-net";
pub const NETCONF: &str = r#"{"cniVersion":"1.0.0","name":"sriov-net","type":"sriov","vlan":100}"#;

pub type Manager = DeviceStateManager<FakeHost, FakeLookup, FakeExec>;

#[derive(Debug, Default)]
pub struct HostState {
    pub drivers: HashMap<String, String>,
    pub binds: Vec<(String, String)>,
    pub restores: Vec<(String, String)>,
}

/// Host whose VFs all start on `iavf`.
#[derive(Clone, Default)]
pub struct FakeHost {
    pub state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn binds(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().binds.clone()
    }

    pub fn restores(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().restores.clone()
    }

    pub fn driver(&self, pci_address: &str) -> String {
        self.state
            .lock()
            .unwrap()
            .drivers
            .get(pci_address)
            .cloned()
            .unwrap_or_else(|| "iavf".to_string())
    }
}

#[async_trait]
impl DeviceHost for FakeHost {
    async fn current_driver(&self, pci_address: &str) -> Result<Option<String>, Report<HostError>> {
        Ok(Some(self.driver(pci_address)))
    }

    async fn bind_driver(&self, pci_address: &str, driver: &str) -> Result<(), Report<HostError>> {
        let mut state = self.state.lock().unwrap();
        state.binds.push((pci_address.to_string(), driver.to_string()));
        state
            .drivers
            .insert(pci_address.to_string(), driver.to_string());
        Ok(())
    }

    async fn restore_driver(
        &self,
        pci_address: &str,
        original_driver: &str,
    ) -> Result<(), Report<HostError>> {
        let mut state = self.state.lock().unwrap();
        state
            .restores
            .push((pci_address.to_string(), original_driver.to_string()));
        state
            .drivers
            .insert(pci_address.to_string(), original_driver.to_string());
        Ok(())
    }

    async fn iommu_group(&self, _pci_address: &str) -> Result<Option<String>, Report<HostError>> {
        Ok(Some("42".to_string()))
    }
}

#[derive(Debug, Default)]
pub struct LookupState {
    pub nads: HashMap<(String, String), String>,
    pub macs: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct FakeLookup {
    pub state: Arc<Mutex<LookupState>>,
}

impl Default for FakeLookup {
    fn default() -> Self {
        let lookup = Self {
            state: Arc::default(),
        };
        lookup.add_nad(NAMESPACE, NETWORK, NETCONF);
        lookup
    }
}

impl FakeLookup {
    pub fn add_nad(&self, namespace: &str, name: &str, config: &str) {
        self.state
            .lock()
            .unwrap()
            .nads
            .insert((namespace.to_string(), name.to_string()), config.to_string());
    }

    pub fn set_mac(&self, network: &str, mac: &str) {
        self.state
            .lock()
            .unwrap()
            .macs
            .insert(network.to_string(), mac.to_string());
    }
}

#[async_trait]
impl ClusterLookup for FakeLookup {
    async fn net_attach_def_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<String, Report<KubernetesError>> {
        self.state
            .lock()
            .unwrap()
            .nads
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                Report::new(KubernetesError::NetAttachDef {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    message: "not found".to_string(),
                })
            })
    }

    async fn pod_network_macs(
        &self,
        _namespace: &str,
        _pod_name: &str,
    ) -> Result<BTreeMap<String, String>, Report<KubernetesError>> {
        Ok(self.state.lock().unwrap().macs.clone())
    }
}

#[derive(Debug, Clone)]
pub struct PluginCall {
    pub command: String,
    pub if_name: String,
    pub netns: String,
    pub netconf: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct ExecState {
    pub calls: Vec<PluginCall>,
    /// `deviceID`s whose ADD fails with a non-retryable error.
    pub failing_devices: HashSet<String>,
}

/// Plugin answering ADD with one sandboxed interface and one address.
#[derive(Clone, Default)]
pub struct FakeExec {
    pub state: Arc<Mutex<ExecState>>,
}

impl FakeExec {
    pub fn calls(&self, command: &str) -> Vec<PluginCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.command == command)
            .cloned()
            .collect()
    }

    pub fn fail_device(&self, pci_address: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_devices
            .insert(pci_address.to_string());
    }
}

#[async_trait]
impl PluginExec for FakeExec {
    async fn exec_plugin(
        &self,
        _plugin_path: &Path,
        stdin: &[u8],
        env: &[(String, String)],
    ) -> io::Result<ExecOutput> {
        let var = |name: &str| {
            env.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let netconf: serde_json::Value = serde_json::from_slice(stdin).unwrap();
        let call = PluginCall {
            command: var("CNI_COMMAND"),
            if_name: var("CNI_IFNAME"),
            netns: var("CNI_NETNS"),
            netconf: netconf.clone(),
        };
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());

        if call.command != "ADD" {
            return Ok(ExecOutput {
                success: true,
                ..Default::default()
            });
        }

        let device_id = netconf["deviceID"].as_str().unwrap_or_default();
        if state.failing_devices.contains(device_id) {
            return Ok(ExecOutput {
                success: false,
                stdout: br#"{"cniVersion":"1.0.0","code":7,"msg":"vf is busy"}"#.to_vec(),
                stderr: Vec::new(),
            });
        }

        let result = serde_json::json!({
            "cniVersion": "1.0.0",
            "interfaces": [{
                "name": call.if_name,
                "mac": "02:00:00:00:00:01",
                "sandbox": call.netns,
            }],
            "ips": [{"address": "10.56.217.10/24", "interface": 0}],
        });
        Ok(ExecOutput {
            success: true,
            stdout: serde_json::to_vec(&result).unwrap(),
            stderr: Vec::new(),
        })
    }

    fn find_in_path(&self, plugin: &str, _paths: &[PathBuf]) -> Result<PathBuf, CniError> {
        Ok(PathBuf::from("/opt/cni/bin").join(plugin))
    }
}

/// One node's worth of fakes plus the directories the manager writes to.
pub struct Fixture {
    pub host: FakeHost,
    pub lookup: FakeLookup,
    pub exec: FakeExec,
    pub data_dir: TempDir,
    pub result_dir: TempDir,
    pub include_network_data: bool,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            host: FakeHost::default(),
            lookup: FakeLookup::default(),
            exec: FakeExec::default(),
            data_dir: TempDir::new().unwrap(),
            result_dir: TempDir::new().unwrap(),
            include_network_data: false,
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.path().join("checkpoint.json")
    }

    /// Make checkpoint saves fail by occupying the temp file path with a
    /// directory.
    pub fn block_checkpoint_writes(&self) {
        std::fs::create_dir(self.data_dir.path().join("checkpoint.json.tmp")).unwrap();
    }

    pub fn allow_checkpoint_writes(&self) {
        std::fs::remove_dir(self.data_dir.path().join("checkpoint.json.tmp")).unwrap();
    }

    pub fn result_file(&self, pod_uid: &str) -> PathBuf {
        self.result_dir.path().join(format!("{pod_uid}.json"))
    }

    pub async fn try_manager(&self) -> Result<Manager, Report<DeviceStateError>> {
        let cni = CniRuntime::new(self.exec.clone(), vec![PathBuf::from("/opt/cni/bin")])
            .with_backoff(Backoff {
                initial: Duration::from_millis(1),
                cap: Duration::from_millis(2),
                ..Backoff::default()
            });
        DeviceStateManager::new(
            self.host.clone(),
            self.lookup.clone(),
            cni,
            ResultFiles::new(
                self.result_dir.path(),
                "/var/run/sriov-dra",
                self.include_network_data,
            ),
            CheckpointStore::new(self.data_dir.path()),
            devices(8),
        )
        .await
    }

    pub async fn manager(&self) -> Manager {
        self.try_manager().await.expect("manager should start")
    }
}

pub fn pci_address(index: usize) -> String {
    format!("0000:3b:02.{index}")
}

pub fn device_name(index: usize) -> String {
    format!("vf-{index}")
}

pub fn devices(count: usize) -> AllocatableDevices {
    (0..count)
        .map(|index| {
            let device = AllocatableDevice {
                name: device_name(index),
                pci_address: pci_address(index),
                vendor_id: "8086".to_string(),
                device_id: "154c".to_string(),
                pf_name: "ens1f0".to_string(),
                parent_pci_address: "0000:3b:00.0".to_string(),
                vf_id: index as u32,
                numa_node: Some(0),
                driver: "iavf".to_string(),
                resource_name: String::new(),
            };
            (device.pci_address.clone(), device)
        })
        .collect()
}

/// Claim reserved for `pod_uid` with one request per device index, all
/// configured with `driver` on [`NETWORK`].
pub fn claim(uid: &str, pod_uid: &str, device_indexes: &[usize], driver: &str) -> ResourceClaim {
    let requests: Vec<String> = (0..device_indexes.len()).map(|i| format!("vf{i}")).collect();
    let results = device_indexes
        .iter()
        .enumerate()
        .map(|(i, index)| DeviceRequestAllocationResult {
            request: format!("vf{i}"),
            driver: DRIVER_NAME.to_string(),
            pool: "worker-0".to_string(),
            device: device_name(*index),
        })
        .collect();
    let parameters = serde_json::to_vec(&VfConfig::new(driver, NETWORK)).unwrap();

    ResourceClaim {
        namespace: NAMESPACE.to_string(),
        name: format!("claim-{uid}"),
        uid: uid.to_string(),
        reserved_for: vec![ResourceClaimConsumerReference {
            api_group: String::new(),
            resource: "pods".to_string(),
            name: format!("pod-{pod_uid}"),
            uid: pod_uid.to_string(),
        }],
        allocation: Some(AllocationResult {
            devices: DeviceAllocationResult {
                results,
                config: vec![DeviceAllocationConfiguration {
                    source: "FromClaim".to_string(),
                    requests,
                    opaque: Some(OpaqueDeviceConfiguration {
                        driver: DRIVER_NAME.to_string(),
                        parameters: parameters.into(),
                    }),
                }],
            },
        }),
    }
}

pub fn netns(pod_uid: &str) -> String {
    format!("/var/run/netns/{pod_uid}")
}

pub fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
