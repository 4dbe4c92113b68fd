use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::RwLock;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::CacheError;
use super::HostState;
use crate::k8s::pod;
use crate::k8s::ClusterEvent;
use crate::k8s::ClusterLister;
use crate::topology::Topology;
use crate::topology::TOPOLOGY_ANNOTATION;

/// Process-wide registry of [`HostState`]s plus the set of workloads known to
/// occupy devices.
///
/// The host map and the known set share one lock. It is never held while a
/// host lock is taken, so there is no snapshot across hosts: a host may change
/// between two lookups, which is fine for advisory scores.
pub struct SchedulerCache {
    lister: Arc<dyn ClusterLister>,
    state: RwLock<CacheState>,
}

#[derive(Default)]
struct CacheState {
    nodes: HashMap<String, Arc<HostState>>,
    known_pods: HashSet<String>,
}

impl SchedulerCache {
    pub fn new(lister: Arc<dyn ClusterLister>) -> Self {
        Self {
            lister,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Replay the current hosts and bound workloads into the cache.
    ///
    /// Hosts without a topology annotation are tracked with an empty topology;
    /// hosts whose annotation does not decode are skipped. Only workloads that
    /// are bound and not terminated are replayed, so a finished workload never
    /// reclaims devices handed to its successor.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NodeNotFound`] if a host or a workload's host vanished
    ///   while replaying
    pub fn build(&self) -> Result<(), Report<CacheError>> {
        info!("Building scheduler cache");

        for node in self.lister.list_nodes() {
            let name = node.metadata.name.as_deref().unwrap_or_default();
            match node_topology(&node) {
                Some(Ok(topology)) => self.add_or_update_host(name, topology)?,
                Some(Err(e)) => {
                    error!(node = %name, "Failed to decode node topology: {e:?}");
                }
                None => {
                    self.get_host_state(name)?;
                }
            }
        }

        for pod in self.lister.list_pods() {
            if !pod::is_assigned_non_terminated(&pod) {
                continue;
            }
            self.add_or_update_workload(&pod)?;
        }

        let state = self.state.read().expect("poisoned");
        info!(
            nodes = state.nodes.len(),
            known_pods = state.known_pods.len(),
            "Scheduler cache built"
        );
        Ok(())
    }

    /// Whether the workload with `workload_key` occupies devices.
    pub fn known(&self, workload_key: &str) -> bool {
        self.state
            .read()
            .expect("poisoned")
            .known_pods
            .contains(workload_key)
    }

    /// Authoritative workload lookup.
    ///
    /// # Errors
    ///
    /// - [`CacheError::PodNotFound`] if the workload does not exist
    pub fn get_workload(&self, namespace: &str, name: &str) -> Result<Arc<Pod>, Report<CacheError>> {
        self.lister.get_pod(namespace, name).ok_or_else(|| {
            Report::new(CacheError::PodNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
        })
    }

    /// Install `topology` on host `name`, creating the host state if needed.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NodeNotFound`] if the host does not exist
    pub fn add_or_update_host(
        &self,
        name: &str,
        topology: Topology,
    ) -> Result<(), Report<CacheError>> {
        self.ensure_node_exists(name)?;
        let topology = Arc::new(topology);
        let devices = topology.len();

        let existing = {
            let mut state = self.state.write().expect("poisoned");
            match state.nodes.get(name) {
                Some(host) => Some(host.clone()),
                None => {
                    state.nodes.insert(
                        name.to_string(),
                        Arc::new(HostState::with_topology(name, topology.clone())),
                    );
                    None
                }
            }
        };
        // the host lock is only taken once the cache lock is released
        if let Some(host) = existing {
            host.set_topology(topology);
        }
        info!(node = %name, devices, "Updated node topology");
        Ok(())
    }

    /// Host state for `name`, created empty on first use.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NodeNotFound`] if the host does not exist
    pub fn get_host_state(&self, name: &str) -> Result<Arc<HostState>, Report<CacheError>> {
        self.ensure_node_exists(name)?;

        if let Some(host) = self.state.read().expect("poisoned").nodes.get(name) {
            return Ok(host.clone());
        }

        let mut state = self.state.write().expect("poisoned");
        let host = state
            .nodes
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(node = %name, "Creating node state");
                Arc::new(HostState::new(name))
            })
            .clone();
        Ok(host)
    }

    /// Record the devices a bound workload occupies.
    ///
    /// Workloads not yet bound to a host are ignored.
    ///
    /// # Errors
    ///
    /// - [`CacheError::NodeNotFound`] if the workload's host does not exist
    pub fn add_or_update_workload(&self, pod: &Pod) -> Result<(), Report<CacheError>> {
        let Some(node_name) = pod::assigned_node(pod) else {
            debug!(
                pod = pod::name(pod),
                namespace = pod::namespace(pod),
                "Pod is not assigned to any node, skip"
            );
            return Ok(());
        };

        let host = self.get_host_state(node_name)?;
        let key = pod::workload_key(pod);
        let device_ids = pod::device_ids(pod);

        if host.occupy(&key, &device_ids) {
            self.remember_pod(key);
        } else {
            info!(
                pod = pod::name(pod),
                namespace = pod::namespace(pod),
                node = %node_name,
                devices = ?device_ids,
                "Pod occupies no device of the node, skip"
            );
        }
        Ok(())
    }

    /// Release the devices of a finished workload and forget it.
    ///
    /// Devices already handed to another workload stay with it.
    pub fn remove_workload(&self, pod: &Pod) {
        let key = pod::workload_key(pod);
        let device_ids = pod::device_ids(pod);
        match pod::assigned_node(pod).map(|node| self.get_host_state(node)) {
            Some(Ok(host)) => host.release(&key, &device_ids),
            Some(Err(e)) => {
                debug!(pod = pod::name(pod), "Failed to get node of removed pod: {e:?}");
            }
            None => {
                debug!(pod = pod::name(pod), "Removed pod was never assigned to a node");
            }
        }

        self.forget_pod(&key);
    }

    /// Apply one change-feed notification.
    pub fn handle_event(&self, event: ClusterEvent) {
        match event {
            ClusterEvent::NodeUpserted { node } => self.handle_node(&node),
            ClusterEvent::PodUpserted { pod } => {
                if pod::is_complete(&pod) {
                    self.remove_workload(&pod);
                } else if pod::assigned_node(&pod).is_some()
                    && !self.known(&pod::workload_key(&pod))
                {
                    if let Err(e) = self.add_or_update_workload(&pod) {
                        warn!(pod = pod::name(&pod), "Failed to add pod: {e:?}");
                    }
                }
            }
            ClusterEvent::PodRemoved { pod } => self.remove_workload(&pod),
        }
    }

    fn handle_node(&self, node: &Node) {
        let name = node.metadata.name.as_deref().unwrap_or_default();
        let result = match node_topology(node) {
            None => {
                debug!(node = %name, "Node has no topology annotation");
                return;
            }
            Some(topology) => {
                topology.and_then(|topology| self.add_or_update_host(name, topology))
            }
        };
        if let Err(e) = result {
            warn!(node = %name, "Failed to update node topology: {e:?}");
        }
    }

    fn ensure_node_exists(&self, name: &str) -> Result<(), Report<CacheError>> {
        match self.lister.get_node(name) {
            Some(_) => Ok(()),
            None => Err(Report::new(CacheError::NodeNotFound {
                name: name.to_string(),
            })),
        }
    }

    fn remember_pod(&self, key: String) {
        self.state
            .write()
            .expect("poisoned")
            .known_pods
            .insert(key);
    }

    fn forget_pod(&self, key: &str) {
        self.state
            .write()
            .expect("poisoned")
            .known_pods
            .remove(key);
    }
}

/// Topology published on the node annotation, `None` if there is none.
fn node_topology(node: &Node) -> Option<Result<Topology, Report<CacheError>>> {
    let name = node.metadata.name.as_deref().unwrap_or_default();
    let raw = node.metadata.annotations.as_ref()?.get(TOPOLOGY_ANNOTATION)?;
    Some(
        Topology::decode(raw.as_bytes()).change_context(CacheError::InvalidTopology {
            node: name.to_string(),
        }),
    )
}
