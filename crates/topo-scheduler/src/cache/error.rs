use core::error::Error;

/// Scheduler cache errors
#[derive(Debug, derive_more::Display)]
pub enum CacheError {
    #[display("Node not found: {name}")]
    NodeNotFound { name: String },
    #[display("Pod not found: {name} in namespace {namespace}")]
    PodNotFound { name: String, namespace: String },
    #[display("No free devices on node {node}")]
    NoFreeDevices { node: String },
    #[display("Invalid topology annotation on node {node}")]
    InvalidTopology { node: String },
}

impl Error for CacheError {}
