use std::sync::Arc;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher;
use kube::runtime::watcher::Config;
use kube::runtime::watcher::Event;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cache::SchedulerCache;
use crate::k8s::ClusterEvent;
use crate::k8s::KubernetesError;
use crate::k8s::ReflectorLister;

/// Watches nodes and pods, keeping the reflector stores behind
/// [`ReflectorLister`] current and forwarding changes to the scheduler cache.
pub struct ClusterFeed {
    client: Client,
    node_writer: Writer<Node>,
    pod_writer: Writer<Pod>,
    synced: watch::Sender<bool>,
}

impl ClusterFeed {
    /// Create the feed together with the lister reading its stores.
    pub fn new(client: Client) -> (Self, ReflectorLister) {
        let (node_reader, node_writer) = reflector::store();
        let (pod_reader, pod_writer) = reflector::store();
        let (synced, synced_rx) = watch::channel(false);
        (
            Self {
                client,
                node_writer,
                pod_writer,
                synced,
            },
            ReflectorLister::new(node_reader, pod_reader, synced_rx),
        )
    }

    /// Run until cancelled.
    ///
    /// A watch restart replays every current object as an upsert, which the
    /// cache handles idempotently. The lister is marked ready after the first
    /// listing of both resources.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::WatchFailed`] if a watch stream terminates
    #[tracing::instrument(skip_all)]
    pub async fn run(
        self,
        cache: Arc<SchedulerCache>,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting cluster feed");

        let nodes: Api<Node> = Api::all(self.client.clone());
        let pods: Api<Pod> = Api::all(self.client);

        let mut node_stream = reflector(self.node_writer, watcher(nodes, Config::default()))
            .default_backoff()
            .boxed();
        let mut pod_stream = reflector(self.pod_writer, watcher(pods, Config::default()))
            .default_backoff()
            .boxed();

        let mut nodes_listed = false;
        let mut pods_listed = false;

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Cluster feed shutdown requested");
                    break;
                }
                event = node_stream.next() => match event {
                    Some(Ok(event)) => {
                        nodes_listed |= matches!(event, Event::Restarted(_));
                        node_events(event)
                            .into_iter()
                            .for_each(|event| cache.handle_event(event));
                    }
                    Some(Err(e)) => warn!("Node watch error: {e}"),
                    None => return Err(stream_ended("nodes")),
                },
                event = pod_stream.next() => match event {
                    Some(Ok(event)) => {
                        pods_listed |= matches!(event, Event::Restarted(_));
                        pod_events(event)
                            .into_iter()
                            .for_each(|event| cache.handle_event(event));
                    }
                    Some(Err(e)) => warn!("Pod watch error: {e}"),
                    None => return Err(stream_ended("pods")),
                },
            }

            if nodes_listed && pods_listed && !*self.synced.borrow() {
                info!("Initial cluster listing received");
                self.synced.send_replace(true);
            }
        }

        Ok(())
    }
}

fn stream_ended(resource: &str) -> Report<KubernetesError> {
    Report::new(KubernetesError::WatchFailed {
        resource: resource.to_string(),
        message: "watch stream ended".to_string(),
    })
}

fn node_events(event: Event<Node>) -> Vec<ClusterEvent> {
    match event {
        Event::Applied(node) => vec![ClusterEvent::NodeUpserted {
            node: Box::new(node),
        }],
        Event::Deleted(node) => {
            debug!(node = ?node.metadata.name, "Node deleted");
            Vec::new()
        }
        Event::Restarted(nodes) => nodes
            .into_iter()
            .map(|node| ClusterEvent::NodeUpserted {
                node: Box::new(node),
            })
            .collect(),
    }
}

fn pod_events(event: Event<Pod>) -> Vec<ClusterEvent> {
    match event {
        Event::Applied(pod) => vec![ClusterEvent::PodUpserted { pod: Box::new(pod) }],
        Event::Deleted(pod) => vec![ClusterEvent::PodRemoved { pod: Box::new(pod) }],
        Event::Restarted(pods) => pods
            .into_iter()
            .map(|pod| ClusterEvent::PodUpserted { pod: Box::new(pod) })
            .collect(),
    }
}
