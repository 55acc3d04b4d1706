use serde::Deserialize;
use serde::Serialize;

/// Namespace type carrying the pod network.
pub const NETWORK_NAMESPACE_TYPE: &str = "network";

/// Pod sandbox as reported by the container runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSandbox {
    pub id: String,
    pub name: String,
    pub uid: String,
    pub namespace: String,
    #[serde(default)]
    pub linux: Option<LinuxPodSandbox>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxPodSandbox {
    #[serde(default)]
    pub namespaces: Vec<LinuxNamespace>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxNamespace {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub path: String,
}

/// Path of the sandbox's network namespace, or `""` when it has none yet.
pub fn network_namespace(sandbox: &PodSandbox) -> String {
    sandbox
        .linux
        .iter()
        .flat_map(|linux| linux.namespaces.iter())
        .find(|ns| ns.kind == NETWORK_NAMESPACE_TYPE)
        .map(|ns| ns.path.clone())
        .unwrap_or_default()
}

/// Container lifecycle events the driver reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    RunPodSandbox(PodSandbox),
    CreateContainer { pod: PodSandbox, container_id: String },
    StartContainer { pod: PodSandbox, container_id: String },
    StopPodSandbox(PodSandbox),
    RemovePodSandbox(PodSandbox),
}

impl LifecycleEvent {
    pub fn pod(&self) -> &PodSandbox {
        match self {
            Self::RunPodSandbox(pod)
            | Self::StopPodSandbox(pod)
            | Self::RemovePodSandbox(pod)
            | Self::CreateContainer { pod, .. }
            | Self::StartContainer { pod, .. } => pod,
        }
    }

    /// Whether the pod's network namespace is going away.
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::StopPodSandbox(_) | Self::RemovePodSandbox(_))
    }
}
