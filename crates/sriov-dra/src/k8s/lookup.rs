//! API server lookups needed while preparing a device

use std::collections::BTreeMap;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ApiResource;
use kube::api::DynamicObject;
use kube::api::GroupVersionKind;
use kube::Api;
use kube::Client;

use super::KubernetesError;
use crate::consts::NETWORK_MACS_ANNOTATION;

const NAD_GROUP: &str = "k8s.cni.cncf.io";
const NAD_VERSION: &str = "v1";
const NAD_KIND: &str = "NetworkAttachmentDefinition";
const NAD_PLURAL: &str = "network-attachment-definitions";

#[async_trait]
pub trait ClusterLookup: Send + Sync {
    /// `spec.config` of a NetworkAttachmentDefinition.
    async fn net_attach_def_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<String, Report<KubernetesError>>;

    /// Network name to MAC map from the pod annotation; empty when unset.
    async fn pod_network_macs(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> Result<BTreeMap<String, String>, Report<KubernetesError>>;
}

/// MAC requested for a network, matched by `namespace/name` or bare name.
pub fn mac_for_network<'a>(
    macs: &'a BTreeMap<String, String>,
    namespace: &str,
    name: &str,
) -> Option<&'a str> {
    macs.get(&format!("{namespace}/{name}"))
        .or_else(|| macs.get(name))
        .map(String::as_str)
        .filter(|mac| !mac.is_empty())
}

/// Parse the MAC annotation value.
pub fn parse_network_macs(
    annotation: &str,
) -> Result<BTreeMap<String, String>, Report<KubernetesError>> {
    serde_json::from_str(annotation).change_context(KubernetesError::AnnotationParseError {
        message: format!("{NETWORK_MACS_ANNOTATION} is not a JSON map of network name to MAC"),
    })
}

/// [`ClusterLookup`] against the API server.
#[derive(Clone)]
pub struct KubeClusterLookup {
    client: Client,
    nad_resource: ApiResource,
}

impl KubeClusterLookup {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(NAD_GROUP, NAD_VERSION, NAD_KIND);
        Self {
            client,
            nad_resource: ApiResource::from_gvk_with_plural(&gvk, NAD_PLURAL),
        }
    }
}

#[async_trait]
impl ClusterLookup for KubeClusterLookup {
    async fn net_attach_def_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<String, Report<KubernetesError>> {
        let nad_error = |message: &str| KubernetesError::NetAttachDef {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.to_string(),
        };

        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.nad_resource);
        let nad = api
            .get(name)
            .await
            .change_context_lazy(|| nad_error("failed to get"))?;

        nad.data
            .get("spec")
            .and_then(|spec| spec.get("config"))
            .and_then(|config| config.as_str())
            .filter(|config| !config.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| Report::new(nad_error("spec.config is empty")))
    }

    async fn pod_network_macs(
        &self,
        namespace: &str,
        pod_name: &str,
    ) -> Result<BTreeMap<String, String>, Report<KubernetesError>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = api
            .get(pod_name)
            .await
            .change_context_lazy(|| KubernetesError::PodLookupFailed {
                namespace: namespace.to_string(),
                pod_name: pod_name.to_string(),
            })?;

        match pod
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(NETWORK_MACS_ANNOTATION))
        {
            Some(annotation) => parse_network_macs(annotation),
            None => Ok(BTreeMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn mac_lookup_prefers_qualified_name() {
        let macs = parse_network_macs(
            r#"{"infra/sriov-net": "02:00:00:00:00:01", "sriov-net": "02:00:00:00:00:02", "other": ""}"#,
        )
        .unwrap();

        assert_eq!(mac_for_network(&macs, "infra", "sriov-net"), Some("02:00:00:00:00:01"));
        assert_eq!(mac_for_network(&macs, "default", "sriov-net"), Some("02:00:00:00:00:02"));
        assert_eq!(mac_for_network(&macs, "default", "other"), None);
        assert_eq!(mac_for_network(&macs, "default", "missing"), None);
    }

    #[test]
    fn malformed_annotation_is_an_error() {
        let err = parse_network_macs("[1, 2]").unwrap_err();

        assert!(matches!(
            err.current_context(),
            KubernetesError::AnnotationParseError { .. }
        ));
    }
}
