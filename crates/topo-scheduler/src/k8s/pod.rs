//! Fields the scheduler reads from workload objects.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::Pod;
use tracing::warn;

/// Extended resource counting co-located topology slots. Workloads bound to a
/// host also carry the allocated device UUIDs under an annotation of the same
/// name.
pub const TOPOLOGY_RESOURCE: &str = "nvidia.com/gpu-topo";

/// Stable identity of a workload: its UID, or `namespace/name` when the UID
/// is not set.
pub fn workload_key(pod: &Pod) -> String {
    match pod.metadata.uid.as_deref() {
        Some(uid) if !uid.is_empty() => uid.to_string(),
        _ => format!("{}/{}", namespace(pod), name(pod)),
    }
}

pub fn name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or("unknown")
}

pub fn namespace(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or("default")
}

/// Host the workload is bound to, if any.
pub fn assigned_node(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.node_name.as_deref())
        .filter(|node| !node.is_empty())
}

/// Device UUIDs recorded on the workload by the device plugin.
pub fn device_ids(pod: &Pod) -> Vec<String> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(TOPOLOGY_RESOURCE))
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|uuid| !uuid.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A workload is complete once it is being deleted or reached a terminal phase.
pub fn is_complete(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return true;
    }
    matches!(
        pod.status.as_ref().and_then(|status| status.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

/// Bound to a host and still running or pending.
pub fn is_assigned_non_terminated(pod: &Pod) -> bool {
    assigned_node(pod).is_some() && !is_complete(pod)
}

/// Number of topology slots requested by the workload.
///
/// Regular containers run together so their requests add up; init containers
/// run one at a time, so the largest of them wins if it exceeds that sum.
pub fn topology_demand(pod: &Pod) -> i64 {
    let Some(spec) = pod.spec.as_ref() else {
        return 0;
    };

    let total: i64 = spec.containers.iter().map(container_demand).sum();

    spec.init_containers
        .iter()
        .flatten()
        .map(container_demand)
        .fold(total, i64::max)
}

fn container_demand(container: &Container) -> i64 {
    container
        .resources
        .as_ref()
        .and_then(|resources| resources.requests.as_ref())
        .map(topology_request)
        .unwrap_or(0)
}

fn topology_request(
    requests: &BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
) -> i64 {
    let Some(quantity) = requests.get(TOPOLOGY_RESOURCE) else {
        return 0;
    };
    parse_quantity(&quantity.0).unwrap_or_else(|| {
        warn!(quantity = %quantity.0, "Ignoring non-integer {TOPOLOGY_RESOURCE} request");
        0
    })
}

/// Parse an integral resource quantity such as "3", "2k" or "1Ki".
///
/// Supports the following suffixes:
/// - Decimal: "k", "M", "G"
/// - Binary: "Ki", "Mi", "Gi"
fn parse_quantity(value: &str) -> Option<i64> {
    let value = value.trim();

    if let Ok(count) = value.parse::<i64>() {
        return Some(count);
    }

    let pos = value.find(|c: char| c.is_alphabetic())?;
    let (numeric_part, unit) = value.split_at(pos);
    let numeric_value = numeric_part.parse::<i64>().ok()?;

    let multiplier: i64 = match unit {
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "Ki" => 1024,
        "Mi" => 1024 * 1024,
        "Gi" => 1024 * 1024 * 1024,
        _ => return None,
    };

    numeric_value.checked_mul(multiplier)
}

#[cfg(test)]
pub(crate) mod tests {
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::api::core::v1::ResourceRequirements;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use super::*;

    fn container(name: &str, topo: Option<&str>) -> Container {
        let requests = topo.map(|value| {
            BTreeMap::from([(TOPOLOGY_RESOURCE.to_string(), Quantity(value.to_string()))])
        });
        Container {
            name: name.to_string(),
            resources: Some(ResourceRequirements {
                requests,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub(crate) fn create_test_pod(
        name: &str,
        node_name: Option<&str>,
        device_ids: Option<&str>,
    ) -> Pod {
        let annotations = device_ids.map(|ids| {
            BTreeMap::from([(TOPOLOGY_RESOURCE.to_string(), ids.to_string())])
        });
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some(format!("uid-{name}")),
                annotations,
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: node_name.map(str::to_string),
                containers: vec![container("main", None)],
                ..Default::default()
            }),
            status: None,
        }
    }

    pub(crate) fn with_topology_request(mut pod: Pod, count: &str) -> Pod {
        if let Some(spec) = pod.spec.as_mut() {
            spec.containers = vec![container("main", Some(count))];
        }
        pod
    }

    #[test]
    fn demand_sums_regular_containers() {
        let pod = Pod {
            spec: Some(PodSpec {
                containers: vec![
                    container("a", Some("2")),
                    container("b", Some("1")),
                    container("c", None),
                ],
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(topology_demand(&pod), 3);
    }

    #[test]
    fn demand_takes_larger_init_container() {
        let pod = Pod {
            spec: Some(PodSpec {
                containers: vec![container("a", Some("1")), container("b", Some("2"))],
                init_containers: Some(vec![container("init", Some("5"))]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(topology_demand(&pod), 5);

        let smaller_init = Pod {
            spec: Some(PodSpec {
                containers: vec![container("a", Some("3"))],
                init_containers: Some(vec![container("init", Some("1"))]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(topology_demand(&smaller_init), 3);
    }

    #[test]
    fn demand_without_spec_is_zero() {
        assert_eq!(topology_demand(&Pod::default()), 0);
    }

    #[test]
    fn parse_quantity_units() {
        assert_eq!(parse_quantity("3"), Some(3));
        assert_eq!(parse_quantity(" 6 "), Some(6));
        assert_eq!(parse_quantity("2k"), Some(2000));
        assert_eq!(parse_quantity("1Ki"), Some(1024));
        assert_eq!(parse_quantity("500m"), None);
        assert_eq!(parse_quantity("1.5"), None);
        assert_eq!(parse_quantity("abc"), None);
    }

    #[test]
    fn device_ids_from_annotation() {
        let pod = create_test_pod("p", Some("node-a"), Some("GPU-0, GPU-1,,"));
        assert_eq!(device_ids(&pod), vec!["GPU-0", "GPU-1"]);

        let bare = create_test_pod("p", Some("node-a"), None);
        assert!(device_ids(&bare).is_empty());
    }

    #[test]
    fn workload_key_prefers_uid() {
        let pod = create_test_pod("p", None, None);
        assert_eq!(workload_key(&pod), "uid-p");

        let mut without_uid = pod.clone();
        without_uid.metadata.uid = None;
        assert_eq!(workload_key(&without_uid), "default/p");
    }

    #[test]
    fn completion_and_assignment() {
        let running = create_test_pod("p", Some("node-a"), None);
        assert!(!is_complete(&running));
        assert!(is_assigned_non_terminated(&running));

        let unassigned = create_test_pod("p", Some(""), None);
        assert_eq!(assigned_node(&unassigned), None);
        assert!(!is_assigned_non_terminated(&unassigned));

        let mut succeeded = running.clone();
        succeeded.status = Some(PodStatus {
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });
        assert!(is_complete(&succeeded));

        let mut deleting = running;
        deleting.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
        assert!(is_complete(&deleting));
        assert!(!is_assigned_non_terminated(&deleting));
    }
}
