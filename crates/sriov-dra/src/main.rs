use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use sriov_dra_driver::checkpoint::CheckpointStore;
use sriov_dra_driver::cni::CniRuntime;
use sriov_dra_driver::cni::RawExec;
use sriov_dra_driver::cni::ResultFiles;
use sriov_dra_driver::config::Cli;
use sriov_dra_driver::config::Commands;
use sriov_dra_driver::config::DaemonArgs;
use sriov_dra_driver::config::ShowCheckpointArgs;
use sriov_dra_driver::device_state::DeviceStateManager;
use sriov_dra_driver::host::SysfsHost;
use sriov_dra_driver::k8s::kube_client::init_kube_client;
use sriov_dra_driver::k8s::KubeClusterLookup;
use sriov_dra_driver::nri::LifecycleObserver;
use sriov_dra_driver::types::AllocatableDevices;
use tokio_util::sync::CancellationToken;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
        Commands::ShowCheckpoint(args) => run_show_checkpoint(args).await,
    }
}

async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let _guard = logging::init();

    tracing::info!(
        node_name = %daemon_args.node_name,
        "Starting SR-IOV DRA daemon {}",
        &**version::VERSION
    );

    let allocatable = match &daemon_args.devices_file {
        Some(path) => load_devices_file(path).await?,
        None => AllocatableDevices::new(),
    };

    let client = init_kube_client(daemon_args.kubeconfig.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

    let cancellation_token = CancellationToken::new();
    let cni = CniRuntime::new(RawExec, daemon_args.cni_bin_dirs.clone());
    let result_files = ResultFiles::new(
        &daemon_args.cni_result_dir,
        &daemon_args.container_result_dir,
        daemon_args.cni_result_network_data,
    );
    let manager = DeviceStateManager::new(
        SysfsHost::new(&daemon_args.sysfs_root),
        KubeClusterLookup::new(client),
        cni,
        result_files,
        CheckpointStore::new(&daemon_args.plugin_data_dir),
        allocatable,
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to initialize device state: {e:?}"))?
    .with_shutdown_token(cancellation_token.clone());
    let manager = Arc::new(manager);

    // Lifecycle events come from the NRI plugin (container runtime pod
    // sandbox hooks) and prepare/unprepare from the kubelet DRA plugin
    // service (NodePrepareResources / NodeUnprepareResources). Neither is
    // served by this binary yet; the sender is held so the observer stays up.
    let (observer, _lifecycle_events) = LifecycleObserver::new(manager.clone());
    let observer_task = tokio::spawn(observer.run(cancellation_token.clone()));

    tracing::info!(
        prepared_pods = manager.prepared_claims().await.len(),
        devices = manager.get_allocatable_devices().await.len(),
        "Device state ready"
    );

    wait_for_shutdown_signal().await?;
    tracing::info!("Shutdown signal received, cancelling all tasks");
    cancellation_token.cancel();

    if let Err(e) = observer_task.await {
        tracing::error!("Lifecycle observer task failed: {e}");
    }

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::signal;
    use tokio::signal::unix::SignalKind;

    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler failed")?;
    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("install Ctrl+C handler failed")?;
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
    }
    Ok(())
}

async fn load_devices_file(path: &Path) -> Result<AllocatableDevices> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("read devices file {} failed", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("parse devices file {} failed", path.display()))
}

async fn run_show_checkpoint(args: ShowCheckpointArgs) -> Result<()> {
    let store = CheckpointStore::new(&args.plugin_data_dir);
    let checkpoint = store
        .load()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load checkpoint: {e:?}"))?;

    let output =
        serde_json::to_string_pretty(&checkpoint).context("encode checkpoint failed")?;
    println!("{output}");
    Ok(())
}
