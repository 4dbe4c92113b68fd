//! Shared API type definitions
//!
//! This crate contains the scheduler-extender wire contract spoken between the
//! orchestrator's scheduler and the topology scheduler: the priority request
//! arguments, the scored host list, and the JSON error body.

use k8s_openapi::api::core::v1::Pod;
use serde::Deserialize;
use serde::Serialize;

/// Arguments sent by the scheduler to a priority extender.
///
/// The scheduler may also send the full `Nodes` list; it is ignored because
/// the extender is configured to receive node names only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtenderArgs {
    /// Workload being scheduled
    #[serde(rename = "Pod")]
    pub pod: Pod,
    /// Candidate host names, in the scheduler's order
    #[serde(rename = "NodeNames", default, skip_serializing_if = "Option::is_none")]
    pub node_names: Option<Vec<String>>,
}

/// Score assigned to a single host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPriority {
    /// Host name
    #[serde(rename = "Host")]
    pub host: String,
    /// Higher is better
    #[serde(rename = "Score")]
    pub score: i64,
}

impl HostPriority {
    pub fn new(host: impl Into<String>, score: i64) -> Self {
        Self {
            host: host.into(),
            score,
        }
    }
}

/// Response body of a priority request.
pub type HostPriorityList = Vec<HostPriority>;

/// JSON body returned with HTTP 500 responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extender_args_uses_scheduler_field_names() {
        let json = r#"{
            "Pod": {"metadata": {"name": "trainer", "namespace": "ml"}},
            "Nodes": null,
            "NodeNames": ["node-a", "node-b"]
        }"#;

        let args: ExtenderArgs = serde_json::from_str(json).expect("should decode extender args");

        assert_eq!(args.pod.metadata.name.as_deref(), Some("trainer"));
        assert_eq!(
            args.node_names,
            Some(vec!["node-a".to_string(), "node-b".to_string()])
        );
    }

    #[test]
    fn extender_args_without_node_names() {
        let args: ExtenderArgs =
            serde_json::from_str(r#"{"Pod": {}}"#).expect("should decode without node names");
        assert!(args.node_names.is_none());
    }

    #[test]
    fn host_priority_list_serializes_capitalized() {
        let list: HostPriorityList = vec![HostPriority::new("node-a", 9)];
        let json = serde_json::to_string(&list).expect("should serialize");
        assert_eq!(json, r#"[{"Host":"node-a","Score":9}]"#);
    }

    #[test]
    fn error_response_shape() {
        let json = serde_json::to_value(ErrorResponse::new("boom")).expect("should serialize");
        assert_eq!(json, serde_json::json!({"error": "boom"}));
    }
}
