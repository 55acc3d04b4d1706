//! Device state manager coordinating preparation and release of VFs
//!
//! All reads and writes of the prepared map, the reservation set and the
//! checkpoint happen under one async mutex. Driver binding, API lookups and
//! network plugin calls run with that mutex released; a per-claim lock keeps
//! operations on the same claim from interleaving.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use api_types::DeviceRequestAllocationResult;
use api_types::ResourceClaim;
use api_types::VfConfig;
use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use utils::keyed_lock::KeyedAsyncLock;

use super::config_resolver;
use crate::cdi::cdi_device_id;
use crate::cdi::vf_container_edits;
use crate::cdi::VfEditsRequest;
use crate::checkpoint::Checkpoint;
use crate::checkpoint::CheckpointStore;
use crate::cni::netconf::add_device_id_to_netconf;
use crate::cni::netconf::add_mac_to_netconf;
use crate::cni::CniError;
use crate::cni::CniRuntime;
use crate::cni::PluginExec;
use crate::cni::ResultFiles;
use crate::consts::DRIVER_NAME;
use crate::host::DeviceHost;
use crate::k8s::lookup::mac_for_network;
use crate::k8s::ClusterLookup;
use crate::nri::PodNetworkHandler;
use crate::types::AllocatableDevice;
use crate::types::AllocatableDevices;
use crate::types::Device;
use crate::types::DeviceNetworkData;
use crate::types::NamespacedObject;
use crate::types::PreparedClaimsByPodUID;
use crate::types::PreparedDevice;
use crate::types::PreparedDevices;

const VFIO_PCI_DRIVER: &str = "vfio-pci";
const INTERFACE_NAME_PREFIX: &str = "net";

#[derive(Debug, derive_more::Display)]
pub enum DeviceStateError {
    #[display("Failed to load checkpoint")]
    LoadFailed,
    #[display("Failed to persist checkpoint")]
    PersistFailed,
    #[display("Invalid claim {claim_uid}: {message}")]
    InvalidClaim { claim_uid: String, message: String },
    #[display("Allocated device {device} is not known on this node")]
    DeviceNotFound { device: String },
    #[display("Device {pci_address} is already prepared for claim {claim_uid}")]
    DeviceInUse {
        pci_address: String,
        claim_uid: String,
    },
    #[display("Device {pci_address} is being prepared for another claim")]
    DeviceReserved { pci_address: String },
    #[display("Failed to prepare device {pci_address}: {message}")]
    PrepareFailed {
        pci_address: String,
        message: String,
    },
    #[display("Network setup failed for device {pci_address}")]
    NetworkSetupFailed { pci_address: String },
    #[display("Operation cancelled")]
    Cancelled,
}

impl core::error::Error for DeviceStateError {}

type Result<T> = std::result::Result<T, Report<DeviceStateError>>;

#[derive(Debug)]
struct Reservation {
    pod_uid: String,
    if_name: String,
}

#[derive(Debug, Default)]
struct SharedState {
    prepared: PreparedClaimsByPodUID,
    /// Devices held by prepares that have not been recorded yet.
    reserved: BTreeMap<String, Reservation>,
    /// Network namespace path per pod UID, as reported by the runtime.
    pod_netns: HashMap<String, String>,
}

impl SharedState {
    fn find_claim(&self, claim_uid: &str) -> Option<(&str, &PreparedDevices)> {
        self.prepared.iter().find_map(|(pod_uid, claims)| {
            claims
                .get(claim_uid)
                .map(|devices| (pod_uid.as_str(), devices))
        })
    }

    fn owner_of(&self, pci_address: &str) -> Option<&str> {
        self.prepared
            .values()
            .flat_map(|claims| claims.iter())
            .find(|(_, devices)| devices.iter().any(|d| d.pci_address == pci_address))
            .map(|(claim_uid, _)| claim_uid.as_str())
    }

    /// Interface names taken in the pod, including in-flight prepares.
    fn pod_interface_names(&self, pod_uid: &str) -> BTreeSet<String> {
        let recorded = self
            .prepared
            .get(pod_uid)
            .into_iter()
            .flat_map(|claims| claims.values().flatten())
            .map(|device| device.if_name.clone());
        let in_flight = self
            .reserved
            .values()
            .filter(|reservation| reservation.pod_uid == pod_uid)
            .map(|reservation| reservation.if_name.clone());
        recorded.chain(in_flight).collect()
    }

    fn release_reservations(&mut self, pci_addresses: &[String]) {
        for pci_address in pci_addresses {
            self.reserved.remove(pci_address);
        }
    }
}

/// One allocation result matched to a local device and its resolved config.
struct PlannedDevice {
    result: DeviceRequestAllocationResult,
    device: AllocatableDevice,
    config: VfConfig,
    if_name: String,
}

pub struct DeviceStateManager<H, L, E> {
    host: H,
    lookup: L,
    cni: CniRuntime<E>,
    result_files: ResultFiles,
    store: CheckpointStore,
    state: Mutex<SharedState>,
    allocatable: RwLock<AllocatableDevices>,
    claim_locks: KeyedAsyncLock<String>,
    shutdown: CancellationToken,
}

impl<H, L, E> DeviceStateManager<H, L, E>
where
    H: DeviceHost,
    L: ClusterLookup,
    E: PluginExec,
{
    /// Create the manager from the persisted checkpoint.
    ///
    /// A corrupt checkpoint fails construction; it is never replaced by empty state.
    pub async fn new(
        host: H,
        lookup: L,
        cni: CniRuntime<E>,
        result_files: ResultFiles,
        store: CheckpointStore,
        allocatable: AllocatableDevices,
    ) -> Result<Self> {
        let checkpoint = store
            .load()
            .await
            .change_context(DeviceStateError::LoadFailed)?;
        let prepared = checkpoint.into_prepared_claims();
        info!(
            pods = prepared.len(),
            path = %store.path().display(),
            "Loaded prepared claims from checkpoint"
        );

        Ok(Self {
            host,
            lookup,
            cni,
            result_files,
            store,
            state: Mutex::new(SharedState {
                prepared,
                ..Default::default()
            }),
            allocatable: RwLock::new(allocatable),
            claim_locks: KeyedAsyncLock::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Token cancelling network setup triggered by lifecycle events.
    pub fn with_shutdown_token(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Snapshot of the devices known on this node.
    pub async fn get_allocatable_devices(&self) -> AllocatableDevices {
        self.allocatable.read().await.clone()
    }

    /// Replace the known devices, as reported by discovery.
    pub async fn set_allocatable_devices(&self, devices: AllocatableDevices) {
        *self.allocatable.write().await = devices;
    }

    /// Set resource names by PCI address; returns the addresses that are unknown.
    pub async fn update_device_resource_names(
        &self,
        resource_names: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let mut devices = self.allocatable.write().await;
        let mut unknown = Vec::new();
        for (pci_address, resource_name) in resource_names {
            match devices.get_mut(pci_address) {
                Some(device) => device.resource_name.clone_from(resource_name),
                None => {
                    warn!(pci_address, resource_name, "Resource name for unknown device ignored");
                    unknown.push(pci_address.clone());
                }
            }
        }
        Ok(unknown)
    }

    /// Snapshot of everything currently prepared.
    pub async fn prepared_claims(&self) -> PreparedClaimsByPodUID {
        self.state.lock().await.prepared.clone()
    }

    /// Prepare every device allocated to `claim` for this driver.
    ///
    /// A claim already in the checkpoint is returned as recorded without
    /// touching the host again.
    #[tracing::instrument(skip(self, claim, cancellation_token), fields(claim_uid = %claim.uid))]
    pub async fn prepare(
        &self,
        claim: &ResourceClaim,
        cancellation_token: &CancellationToken,
    ) -> Result<PreparedDevices> {
        let _claim_guard = self.claim_locks.lock(&claim.uid).await;

        if let Some((_, devices)) = self.state.lock().await.find_claim(&claim.uid) {
            debug!("Claim already prepared");
            return Ok(devices.clone());
        }
        if cancellation_token.is_cancelled() {
            return Err(Report::new(DeviceStateError::Cancelled));
        }

        let invalid = |message: String| DeviceStateError::InvalidClaim {
            claim_uid: claim.uid.clone(),
            message,
        };
        let pod = claim
            .pod_reference()
            .ok_or_else(|| Report::new(invalid("not reserved for a pod".to_string())))?;
        let allocation = claim
            .allocation
            .as_ref()
            .ok_or_else(|| Report::new(invalid("not allocated".to_string())))?;
        let results: Vec<_> = allocation
            .devices
            .results
            .iter()
            .filter(|result| result.driver == DRIVER_NAME)
            .cloned()
            .collect();
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let configs = config_resolver::resolve(DRIVER_NAME, &allocation.devices.config)
            .map_err(|e| Report::new(invalid(e.to_string())))?;

        let (planned, netns) = self.reserve(claim, &pod.uid, results, &configs).await?;
        let reserved: Vec<String> = planned.iter().map(|p| p.device.pci_address.clone()).collect();

        let mut prepared = Vec::with_capacity(planned.len());
        let mut macs = None;
        for plan in &planned {
            let outcome = self
                .prepare_device(
                    claim,
                    &pod.name,
                    &pod.uid,
                    plan,
                    netns.as_deref(),
                    &mut macs,
                    cancellation_token,
                )
                .await;
            match outcome {
                Ok(device) => prepared.push(device),
                Err(err) => {
                    error!("Preparing claim failed, rolling back: {err:?}");
                    self.release_devices(&prepared, netns.as_deref()).await;
                    self.state.lock().await.release_reservations(&reserved);
                    return Err(err);
                }
            }
        }

        let persisted = {
            let mut state = self.state.lock().await;
            state.release_reservations(&reserved);
            let mut next = state.prepared.clone();
            next.entry(pod.uid.clone())
                .or_default()
                .insert(claim.uid.clone(), prepared.clone());
            self.commit(&mut state, next).await
        };
        if let Err(err) = persisted {
            self.release_devices(&prepared, netns.as_deref()).await;
            return Err(err);
        }

        for device in &prepared {
            if !self.result_files.includes_network_data() || device.network_data.is_some() {
                self.publish_result(device).await;
            }
        }

        info!(devices = prepared.len(), pod_uid = %pod.uid, "Claim prepared");
        Ok(prepared)
    }

    /// Match allocation results to local devices and reserve them.
    async fn reserve(
        &self,
        claim: &ResourceClaim,
        pod_uid: &str,
        results: Vec<DeviceRequestAllocationResult>,
        configs: &BTreeMap<String, VfConfig>,
    ) -> Result<(Vec<PlannedDevice>, Option<String>)> {
        let allocatable = self.allocatable.read().await;
        let mut state = self.state.lock().await;
        let mut used_names = state.pod_interface_names(pod_uid);
        let mut planned = Vec::with_capacity(results.len());

        for result in results {
            let config = configs.get(&result.request).cloned().ok_or_else(|| {
                Report::new(DeviceStateError::InvalidClaim {
                    claim_uid: claim.uid.clone(),
                    message: format!("no config for request {:?}", result.request),
                })
            })?;
            config.validate().map_err(|e| {
                Report::new(DeviceStateError::InvalidClaim {
                    claim_uid: claim.uid.clone(),
                    message: format!("request {:?}: {e}", result.request),
                })
            })?;

            let device = allocatable
                .values()
                .find(|d| d.name == result.device)
                .cloned()
                .ok_or_else(|| {
                    Report::new(DeviceStateError::DeviceNotFound {
                        device: result.device.clone(),
                    })
                })?;

            if let Some(owner) = state.owner_of(&device.pci_address) {
                return Err(Report::new(DeviceStateError::DeviceInUse {
                    pci_address: device.pci_address.clone(),
                    claim_uid: owner.to_string(),
                }));
            }
            if state.reserved.contains_key(&device.pci_address)
                || planned
                    .iter()
                    .any(|p: &PlannedDevice| p.device.pci_address == device.pci_address)
            {
                return Err(Report::new(DeviceStateError::DeviceReserved {
                    pci_address: device.pci_address.clone(),
                }));
            }

            let if_name = if config.if_name.is_empty() {
                next_interface_name(&used_names)
            } else {
                config.if_name.clone()
            };
            used_names.insert(if_name.clone());

            planned.push(PlannedDevice {
                result,
                device,
                config,
                if_name,
            });
        }

        for plan in &planned {
            state.reserved.insert(
                plan.device.pci_address.clone(),
                Reservation {
                    pod_uid: pod_uid.to_string(),
                    if_name: plan.if_name.clone(),
                },
            );
        }
        Ok((planned, state.pod_netns.get(pod_uid).cloned()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn prepare_device(
        &self,
        claim: &ResourceClaim,
        pod_name: &str,
        pod_uid: &str,
        plan: &PlannedDevice,
        netns: Option<&str>,
        macs: &mut Option<BTreeMap<String, String>>,
        cancellation_token: &CancellationToken,
    ) -> Result<PreparedDevice> {
        let pci_address = plan.device.pci_address.as_str();
        let failed = |message: &str| DeviceStateError::PrepareFailed {
            pci_address: pci_address.to_string(),
            message: message.to_string(),
        };

        let original_driver = self
            .host
            .current_driver(pci_address)
            .await
            .change_context_lazy(|| failed("failed to read current driver"))?
            .unwrap_or_default();

        if plan.config.rebinds_driver() {
            self.host
                .bind_driver(pci_address, &plan.config.driver)
                .await
                .change_context_lazy(|| failed("failed to bind driver"))?;
        }

        let device = self
            .build_prepared_device(claim, pod_name, pod_uid, plan, &original_driver, macs)
            .await;
        let device = match device {
            Ok(device) => device,
            Err(err) => {
                self.restore_driver(pci_address, &plan.config, &original_driver)
                    .await;
                return Err(err);
            }
        };

        let Some(netns) = netns else {
            debug!(pci_address, "Pod network namespace not known yet, deferring network setup");
            return Ok(device);
        };

        match self.cni.attach(&device, netns, cancellation_token).await {
            Ok(attached) => Ok(attached.prepared_device),
            Err(err) => {
                self.restore_driver(pci_address, &plan.config, &original_driver)
                    .await;
                let context = if matches!(err, CniError::Cancelled) {
                    DeviceStateError::Cancelled
                } else {
                    DeviceStateError::NetworkSetupFailed {
                        pci_address: pci_address.to_string(),
                    }
                };
                Err(Report::new(err).change_context(context))
            }
        }
    }

    async fn build_prepared_device(
        &self,
        claim: &ResourceClaim,
        pod_name: &str,
        pod_uid: &str,
        plan: &PlannedDevice,
        original_driver: &str,
        macs: &mut Option<BTreeMap<String, String>>,
    ) -> Result<PreparedDevice> {
        let pci_address = plan.device.pci_address.as_str();
        let failed = |message: String| DeviceStateError::PrepareFailed {
            pci_address: pci_address.to_string(),
            message,
        };

        let (nad_namespace, nad_name) = plan.config.net_attach_def_ref(&claim.namespace);
        let netconf = self
            .lookup
            .net_attach_def_config(nad_namespace, nad_name)
            .await
            .change_context_lazy(|| failed("failed to get network attachment".to_string()))?;
        let mut netconf = add_device_id_to_netconf(&netconf, pci_address)
            .map_err(|e| Report::new(failed(e.to_string())))?;

        if macs.is_none() {
            let fetched = self
                .lookup
                .pod_network_macs(&claim.namespace, pod_name)
                .await
                .change_context_lazy(|| failed("failed to read pod MAC annotation".to_string()))?;
            *macs = Some(fetched);
        }
        if let Some(mac) = macs
            .as_ref()
            .and_then(|macs| mac_for_network(macs, nad_namespace, nad_name))
        {
            netconf = add_mac_to_netconf(&netconf, mac)
                .map_err(|e| Report::new(failed(e.to_string())))?;
        }

        let iommu_group = if plan.config.driver == VFIO_PCI_DRIVER {
            self.host
                .iommu_group(pci_address)
                .await
                .change_context_lazy(|| failed("failed to read IOMMU group".to_string()))?
        } else {
            None
        };

        let host_result_file = self
            .result_files
            .ensure(pod_uid)
            .await
            .map_err(|e| {
                Report::new(e).change_context(failed("failed to create result file".to_string()))
            })?;
        let container_edits = vf_container_edits(&VfEditsRequest {
            request_name: &plan.result.request,
            pci_address,
            iommu_group: iommu_group.as_deref(),
            add_vhost_mount: plan.config.add_vhost_mount,
            host_result_file: &host_result_file,
            container_result_file: &self.result_files.container_path(),
        });

        Ok(PreparedDevice {
            device: Device {
                request_names: vec![plan.result.request.clone()],
                pool_name: plan.result.pool.clone(),
                device_name: plan.result.device.clone(),
                cdi_device_ids: vec![cdi_device_id(&claim.uid, pci_address)],
            },
            claim_namespaced_name: NamespacedObject {
                namespace: claim.namespace.clone(),
                name: claim.name.clone(),
                uid: claim.uid.clone(),
            },
            container_edits,
            config: plan.config.clone(),
            if_name: plan.if_name.clone(),
            pci_address: pci_address.to_string(),
            pod_uid: pod_uid.to_string(),
            net_attach_def_config: netconf,
            original_driver: original_driver.to_string(),
            network_data: None,
        })
    }

    /// Release every device of the claim. Unknown claims are a no-op.
    ///
    /// Teardown failures are logged per device and never keep the claim recorded.
    #[tracing::instrument(skip(self, cancellation_token))]
    pub async fn unprepare(
        &self,
        claim_uid: &str,
        cancellation_token: &CancellationToken,
    ) -> Result<()> {
        let _claim_guard = self.claim_locks.lock(&claim_uid.to_string()).await;

        let (pod_uid, devices, netns) = {
            let state = self.state.lock().await;
            let Some((pod_uid, devices)) = state.find_claim(claim_uid) else {
                debug!("Claim not prepared, nothing to do");
                return Ok(());
            };
            (
                pod_uid.to_string(),
                devices.clone(),
                state.pod_netns.get(pod_uid).cloned(),
            )
        };

        if cancellation_token.is_cancelled() {
            return Err(Report::new(DeviceStateError::Cancelled));
        }

        self.release_devices(&devices, netns.as_deref()).await;

        let pod_released = {
            let mut state = self.state.lock().await;
            let mut next = state.prepared.clone();
            let pod_released = remove_claim(&mut next, &pod_uid, claim_uid);
            self.commit(&mut state, next).await?;
            pod_released
        };

        if pod_released {
            if let Err(e) = self.result_files.remove(&pod_uid).await {
                warn!(pod_uid, "Failed to remove result file: {e}");
            }
        }

        info!(devices = devices.len(), pod_uid, "Claim unprepared");
        Ok(())
    }

    /// Run network setup for every device of the pod that has not had it yet.
    ///
    /// Devices that fail stay pending and are retried on the next call.
    #[tracing::instrument(skip(self, cancellation_token))]
    pub async fn configure_pod_networks(
        &self,
        pod_uid: &str,
        netns: &str,
        cancellation_token: &CancellationToken,
    ) -> Vec<DeviceNetworkData> {
        let claim_uids: Vec<String> = {
            let mut state = self.state.lock().await;
            state
                .pod_netns
                .insert(pod_uid.to_string(), netns.to_string());
            state
                .prepared
                .get(pod_uid)
                .map(|claims| claims.keys().cloned().collect())
                .unwrap_or_default()
        };

        let mut configured = Vec::new();
        for claim_uid in claim_uids {
            let _claim_guard = self.claim_locks.lock(&claim_uid).await;

            let pending: Vec<PreparedDevice> = {
                let state = self.state.lock().await;
                state
                    .prepared
                    .get(pod_uid)
                    .and_then(|claims| claims.get(&claim_uid))
                    .map(|devices| {
                        devices
                            .iter()
                            .filter(|d| d.network_data.is_none())
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default()
            };

            for device in pending {
                if cancellation_token.is_cancelled() {
                    return configured;
                }
                match self.cni.attach(&device, netns, cancellation_token).await {
                    Ok(attached) => {
                        if let Err(err) = self.record_network_data(&claim_uid, &attached).await {
                            error!(
                                pci_address = %device.pci_address,
                                "Failed to record network data, undoing network setup: {err:?}"
                            );
                            if let Err(err) = self.cni.detach(&device, netns).await {
                                warn!(
                                    pci_address = %device.pci_address,
                                    "Network teardown failed: {err}"
                                );
                            }
                            continue;
                        }
                        if self.result_files.includes_network_data() {
                            self.publish_result(&attached.prepared_device).await;
                        }
                        configured.push(attached);
                    }
                    Err(err) => {
                        error!(pci_address = %device.pci_address, "Network setup failed: {err}");
                    }
                }
            }
        }

        configured
    }

    /// Forget the pod's namespace once its sandbox is stopping.
    pub async fn forget_pod_namespace(&self, pod_uid: &str) {
        self.state.lock().await.pod_netns.remove(pod_uid);
    }

    async fn record_network_data(
        &self,
        claim_uid: &str,
        attached: &DeviceNetworkData,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let device = &attached.prepared_device;
        let mut next = state.prepared.clone();
        let Some(recorded) = next
            .get_mut(&device.pod_uid)
            .and_then(|claims| claims.get_mut(claim_uid))
            .and_then(|devices| devices.iter_mut().find(|d| d.pci_address == device.pci_address))
        else {
            return Ok(());
        };
        recorded.network_data = Some(attached.network_data.clone());
        self.commit(&mut state, next).await
    }

    /// Persist `next`, then make it the in-memory state.
    ///
    /// On failure the in-memory state is left untouched.
    async fn commit(&self, state: &mut SharedState, next: PreparedClaimsByPodUID) -> Result<()> {
        let checkpoint = Checkpoint::from_prepared_claims(next.clone());
        self.store
            .save(&checkpoint)
            .await
            .change_context(DeviceStateError::PersistFailed)?;
        state.prepared = next;
        Ok(())
    }

    async fn release_devices(&self, devices: &[PreparedDevice], netns: Option<&str>) {
        join_all(devices.iter().map(|device| self.release_device(device, netns))).await;
    }

    /// Undo network setup and driver binding; failures are only logged.
    async fn release_device(&self, device: &PreparedDevice, netns: Option<&str>) {
        if device.network_data.is_some() {
            if let Err(err) = self.cni.detach(device, netns.unwrap_or_default()).await {
                warn!(pci_address = %device.pci_address, "Network teardown failed: {err}");
            }
        }
        self.restore_driver(&device.pci_address, &device.config, &device.original_driver)
            .await;
    }

    async fn restore_driver(&self, pci_address: &str, config: &VfConfig, original_driver: &str) {
        if !config.rebinds_driver() || config.driver == original_driver {
            return;
        }
        if let Err(err) = self.host.restore_driver(pci_address, original_driver).await {
            warn!(pci_address, original_driver, "Failed to restore driver: {err:?}");
        }
    }

    async fn publish_result(&self, device: &PreparedDevice) {
        if let Err(e) = self
            .result_files
            .append(
                &device.pod_uid,
                &device.result_key(),
                &device.pci_address,
                device.network_data.as_ref(),
            )
            .await
        {
            warn!(pci_address = %device.pci_address, "Failed to append result file: {e}");
        }
    }
}

#[async_trait]
impl<H, L, E> PodNetworkHandler for DeviceStateManager<H, L, E>
where
    H: DeviceHost,
    L: ClusterLookup,
    E: PluginExec,
{
    async fn pod_network_ready(&self, pod_uid: &str, netns: &str) {
        let configured = self
            .configure_pod_networks(pod_uid, netns, &self.shutdown)
            .await;
        if !configured.is_empty() {
            info!(pod_uid, devices = configured.len(), "Pod network configured");
        }
    }

    async fn pod_network_gone(&self, pod_uid: &str) {
        self.forget_pod_namespace(pod_uid).await;
    }
}

/// Remove a claim; returns whether its pod has no claims left.
fn remove_claim(prepared: &mut PreparedClaimsByPodUID, pod_uid: &str, claim_uid: &str) -> bool {
    let Some(claims) = prepared.get_mut(pod_uid) else {
        return true;
    };
    claims.remove(claim_uid);
    if claims.is_empty() {
        prepared.remove(pod_uid);
        return true;
    }
    false
}

fn next_interface_name(used: &BTreeSet<String>) -> String {
    (1..)
        .map(|index| format!("{INTERFACE_NAME_PREFIX}{index}"))
        .find(|name| !used.contains(name))
        .unwrap_or_else(|| INTERFACE_NAME_PREFIX.to_string())
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn interface_names_fill_the_first_gap() {
        let used: BTreeSet<String> = ["net1", "net3"].iter().map(|s| s.to_string()).collect();

        assert_eq!(next_interface_name(&used), "net2");
        assert_eq!(next_interface_name(&BTreeSet::new()), "net1");
    }

    #[test]
    fn removing_last_claim_releases_pod() {
        let mut prepared = PreparedClaimsByPodUID::new();
        let pod = prepared.entry("pod".to_string()).or_default();
        pod.insert("a".to_string(), Vec::new());
        pod.insert("b".to_string(), Vec::new());

        assert!(!remove_claim(&mut prepared, "pod", "a"));
        assert!(remove_claim(&mut prepared, "pod", "b"));
        assert!(prepared.is_empty());
    }
}
