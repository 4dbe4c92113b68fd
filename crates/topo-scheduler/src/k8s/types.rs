use core::error::Error;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;

/// Change notifications consumed by the scheduler cache.
///
/// Delivery is at-least-once; every handler is idempotent.
#[derive(Debug, Clone)]
#[allow(clippy::enum_variant_names)]
pub enum ClusterEvent {
    /// A host was added or its object changed
    NodeUpserted { node: Box<Node> },
    /// A workload was added or its object changed
    PodUpserted { pod: Box<Pod> },
    /// A workload was deleted
    PodRemoved { pod: Box<Pod> },
}

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to watch {resource}: {message}")]
    WatchFailed { resource: String, message: String },
}

impl Error for KubernetesError {}
