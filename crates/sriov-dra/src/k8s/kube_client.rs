use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;

use super::KubernetesError;

/// Client from an explicit kubeconfig, or in-cluster / `~/.kube/config` otherwise.
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
) -> Result<Client, Report<KubernetesError>> {
    let Some(kubeconfig_path) = kubeconfig else {
        return Client::try_default()
            .await
            .change_context(KubernetesError::ConnectionFailed {
                message: "Failed to create default Kubernetes client".to_string(),
            });
    };

    let connection_failed = |what: &str| KubernetesError::ConnectionFailed {
        message: format!("{what}: {}", kubeconfig_path.display()),
    };

    let kubeconfig = Kubeconfig::read_from(&kubeconfig_path)
        .change_context_lazy(|| connection_failed("Failed to read kubeconfig file"))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context_lazy(|| connection_failed("Failed to load kubeconfig"))?;

    Client::try_from(config)
        .change_context_lazy(|| connection_failed("Failed to create client from kubeconfig"))
}
