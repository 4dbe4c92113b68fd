//! Authoritative view of hosts and workloads.
//!
//! The scheduler cache never talks to the API server directly; it asks a
//! [`ClusterLister`] whether a host or workload still exists. In production
//! the lister reads the stores maintained by the kube reflectors of
//! [`ClusterFeed`](super::watcher::ClusterFeed).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::reflector::Store;
use tokio::sync::watch;

use super::pod;

/// Synchronous lookups against the orchestrator's current state.
pub trait ClusterLister: Send + Sync {
    fn get_node(&self, name: &str) -> Option<Arc<Node>>;

    fn list_nodes(&self) -> Vec<Arc<Node>>;

    fn get_pod(&self, namespace: &str, name: &str) -> Option<Arc<Pod>>;

    fn list_pods(&self) -> Vec<Arc<Pod>>;
}

/// Lister backed by kube reflector stores.
#[derive(Clone)]
pub struct ReflectorLister {
    nodes: Store<Node>,
    pods: Store<Pod>,
    synced: watch::Receiver<bool>,
}

impl ReflectorLister {
    /// `synced` turns true once both stores received their initial listing.
    pub fn new(nodes: Store<Node>, pods: Store<Pod>, synced: watch::Receiver<bool>) -> Self {
        Self {
            nodes,
            pods,
            synced,
        }
    }

    /// Wait until both stores received their initial listing.
    ///
    /// Returns `false` if the feed stopped before that happened.
    pub async fn wait_until_ready(&self) -> bool {
        let mut synced = self.synced.clone();
        // the borrowed value must be gone before `synced` is dropped
        let ready = synced.wait_for(|synced| *synced).await.is_ok();
        ready
    }
}

impl ClusterLister for ReflectorLister {
    fn get_node(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.get(&ObjectRef::new(name))
    }

    fn list_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.state()
    }

    fn get_pod(&self, namespace: &str, name: &str) -> Option<Arc<Pod>> {
        self.pods.get(&ObjectRef::new(name).within(namespace))
    }

    fn list_pods(&self) -> Vec<Arc<Pod>> {
        self.pods.state()
    }
}

/// Lister whose contents are set explicitly, for tests and local tooling.
#[derive(Default)]
pub struct InMemoryLister {
    nodes: RwLock<BTreeMap<String, Arc<Node>>>,
    pods: RwLock<BTreeMap<(String, String), Arc<Pod>>>,
}

impl InMemoryLister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes
            .write()
            .expect("poisoned")
            .insert(name, Arc::new(node));
    }

    pub fn remove_node(&self, name: &str) {
        self.nodes.write().expect("poisoned").remove(name);
    }

    pub fn insert_pod(&self, pod: Pod) {
        let key = (
            pod::namespace(&pod).to_string(),
            pod::name(&pod).to_string(),
        );
        self.pods
            .write()
            .expect("poisoned")
            .insert(key, Arc::new(pod));
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods
            .write()
            .expect("poisoned")
            .remove(&(namespace.to_string(), name.to_string()));
    }
}

impl ClusterLister for InMemoryLister {
    fn get_node(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.read().expect("poisoned").get(name).cloned()
    }

    fn list_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().expect("poisoned").values().cloned().collect()
    }

    fn get_pod(&self, namespace: &str, name: &str) -> Option<Arc<Pod>> {
        self.pods
            .read()
            .expect("poisoned")
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn list_pods(&self) -> Vec<Arc<Pod>> {
        self.pods.read().expect("poisoned").values().cloned().collect()
    }
}
