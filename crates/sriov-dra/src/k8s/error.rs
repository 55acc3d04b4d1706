use core::error::Error;

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("NetworkAttachmentDefinition {namespace}/{name}: {message}")]
    NetAttachDef {
        namespace: String,
        name: String,
        message: String,
    },
    #[display("Failed to look up pod {namespace}/{pod_name}")]
    PodLookupFailed { namespace: String, pod_name: String },
    #[display("Failed to parse annotations: {message}")]
    AnnotationParseError { message: String },
}

impl Error for KubernetesError {}
