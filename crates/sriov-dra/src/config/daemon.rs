use std::path::PathBuf;

use clap::Parser;

use crate::consts::DEFAULT_CNI_BIN_DIR;
use crate::consts::DEFAULT_CNI_RESULT_DIR;
use crate::consts::DEFAULT_CONTAINER_RESULT_DIR;
use crate::consts::DEFAULT_PLUGIN_DATA_DIR;
use crate::consts::DEFAULT_SYSFS_ROOT;

#[derive(Parser, Debug, Clone)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "NODE_NAME",
        help = "Name of the node this daemon runs on"
    )]
    pub node_name: String,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "PLUGIN_DATA_DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = DEFAULT_PLUGIN_DATA_DIR,
        help = "Directory holding the prepared-claims checkpoint"
    )]
    pub plugin_data_dir: PathBuf,

    #[arg(
        long,
        env = "CNI_BIN_DIRS",
        value_delimiter = ',',
        default_value = DEFAULT_CNI_BIN_DIR,
        help = "Comma separated directories searched for CNI plugin binaries"
    )]
    pub cni_bin_dirs: Vec<PathBuf>,

    #[arg(
        long,
        env = "CNI_RESULT_DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = DEFAULT_CNI_RESULT_DIR,
        help = "Host directory for per-pod result files"
    )]
    pub cni_result_dir: PathBuf,

    #[arg(
        long,
        env = "CONTAINER_RESULT_DIR",
        default_value = DEFAULT_CONTAINER_RESULT_DIR,
        help = "Directory the result file is mounted at inside containers"
    )]
    pub container_result_dir: PathBuf,

    #[arg(
        long,
        env = "SYSFS_ROOT",
        value_hint = clap::ValueHint::DirPath,
        default_value = DEFAULT_SYSFS_ROOT,
        help = "Root of the sysfs tree used for driver binding"
    )]
    pub sysfs_root: PathBuf,

    #[arg(
        long,
        env = "CNI_RESULT_NETWORK_DATA",
        help = "Append IPs and MAC address after the PCI address in result files"
    )]
    pub cni_result_network_data: bool,

    #[arg(
        long,
        env = "DEVICES_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "JSON file with the allocatable devices of this node, keyed by PCI address"
    )]
    pub devices_file: Option<PathBuf>,
}
