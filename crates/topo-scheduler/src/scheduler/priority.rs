use std::sync::Arc;

use api_types::ExtenderArgs;
use api_types::HostPriority;
use api_types::HostPriorityList;
use error_stack::Report;
use tracing::debug;
use tracing::error;

use crate::cache::CacheError;
use crate::cache::SchedulerCache;
use crate::k8s::pod;

/// Priority extender scoring hosts by the interconnect topology of their free
/// devices.
pub struct Priority {
    name: String,
    cache: Arc<SchedulerCache>,
}

impl Priority {
    pub fn new(name: impl Into<String>, cache: Arc<SchedulerCache>) -> Self {
        Self {
            name: name.into(),
            cache,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache(&self) -> &Arc<SchedulerCache> {
        &self.cache
    }

    /// Score every candidate host in request order.
    ///
    /// Hosts that cannot be scored are left out of the result instead of
    /// failing the whole request.
    pub fn handle(&self, args: &ExtenderArgs) -> HostPriorityList {
        let demand = pod::topology_demand(&args.pod);
        let node_names = args.node_names.as_deref().unwrap_or_default();
        debug!(
            extender = %self.name,
            pod = pod::name(&args.pod),
            namespace = pod::namespace(&args.pod),
            demand,
            candidates = node_names.len(),
            "Scoring candidate nodes"
        );

        node_names
            .iter()
            .filter_map(|node_name| match self.score_node(node_name, demand) {
                Ok(score) => Some(HostPriority::new(node_name.as_str(), score)),
                Err(e) => {
                    error!(node = %node_name, "Failed to count the score of node: {e:?}");
                    None
                }
            })
            .collect()
    }

    fn score_node(&self, node_name: &str, demand: i64) -> Result<i64, Report<CacheError>> {
        self.cache.get_host_state(node_name)?.score(demand)
    }
}
