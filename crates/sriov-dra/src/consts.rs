use std::time::Duration;

/// Driver identity; opaque configs tagged with another driver are ignored.
pub const DRIVER_NAME: &str = "sriovnetwork.openshift.io";

/// Checkpoint file name inside the plugin data directory.
pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";

/// Pod annotation holding a JSON map of network name to MAC address.
pub const NETWORK_MACS_ANNOTATION: &str = "kubevirt.io/dra-network-macs";

/// File name of the per-pod result file as seen from inside the container.
pub const CONTAINER_RESULT_FILE_NAME: &str = "cni-results.json";

/// Environment variable prefix carrying the PCI address of each injected VF.
pub const PCI_ADDRESS_ENV_PREFIX: &str = "SRIOVNETWORK_PCI";

pub const DEFAULT_PLUGIN_DATA_DIR: &str = "/var/lib/kubelet/plugins/sriovnetwork.openshift.io";
pub const DEFAULT_CNI_BIN_DIR: &str = "/opt/cni/bin";
pub const DEFAULT_CNI_RESULT_DIR: &str = "/var/run/sriov-dra/cni-results";
pub const DEFAULT_CONTAINER_RESULT_DIR: &str = "/var/run/sriov-dra";
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Network plugin retry policy.
pub const CNI_BACKOFF_INITIAL: Duration = Duration::from_millis(100);
pub const CNI_BACKOFF_FACTOR: f64 = 2.0;
pub const CNI_BACKOFF_JITTER: f64 = 0.1;
pub const CNI_BACKOFF_STEPS: u32 = 5;
pub const CNI_BACKOFF_CAP: Duration = Duration::from_secs(2);
