//! Kubernetes integration module.
//!
//! Everything the scheduler needs from the orchestrator lives behind this
//! module: the authoritative host/workload listings ([`ClusterLister`]), the
//! change feed turning watch events into [`ClusterEvent`]s ([`ClusterFeed`]),
//! and the workload fields the scoring reads ([`pod`]).

pub mod kube_client;
pub mod lister;
pub mod pod;
pub mod types;
pub mod watcher;

pub use lister::ClusterLister;
pub use lister::InMemoryLister;
pub use lister::ReflectorLister;
pub use types::ClusterEvent;
pub use types::KubernetesError;
pub use watcher::ClusterFeed;
