//! Kubernetes integration: client setup and the lookups device preparation needs

mod error;
pub mod kube_client;
pub mod lookup;

pub use error::KubernetesError;
pub use lookup::ClusterLookup;
pub use lookup::KubeClusterLookup;
