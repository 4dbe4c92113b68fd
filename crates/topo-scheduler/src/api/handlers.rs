use std::sync::Arc;

use api_types::ErrorResponse;
use api_types::ExtenderArgs;
use api_types::HostPriorityList;
use error_stack::Report;
use error_stack::ResultExt;
use poem::get;
use poem::handler;
use poem::http::StatusCode;
use poem::middleware::Tracing;
use poem::post;
use poem::web::Data;
use poem::web::Json;
use poem::web::Path;
use poem::Endpoint;
use poem::EndpointExt;
use poem::IntoResponse;
use poem::Response;
use poem::Route;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ApiError;
use crate::cache::SchedulerCache;
use crate::scheduler::Priority;
use crate::topology::Topology;

pub const PRIORITY_PATH: &str = "/topo-scheduler/priority";

/// Route tree of the extender.
pub fn routes(priority: Arc<Priority>) -> impl Endpoint {
    let cache = priority.cache().clone();
    Route::new()
        .at(PRIORITY_PATH, post(prioritize))
        .at("/nodes/:name", post(update_node_topology))
        .at("/version", get(version))
        .data(priority)
        .data(cache)
        .with(Tracing)
}

/// Score the candidate nodes of a priority request.
///
/// A body that does not decode is answered with an empty list so the
/// scheduler always gets a usable answer.
#[handler]
pub async fn prioritize(body: Vec<u8>, priority: Data<&Arc<Priority>>) -> Response {
    debug!(path = PRIORITY_PATH, bytes = body.len(), "Priority request");

    let result = match serde_json::from_slice::<ExtenderArgs>(&body) {
        Ok(args) => priority.handle(&args),
        Err(e) => {
            warn!("Failed to parse request due to error {e}");
            HostPriorityList::new()
        }
    };

    match serde_json::to_vec(&result) {
        Ok(body) => {
            info!(
                extender = priority.name(),
                scored = result.len(),
                "Priority request served"
            );
            Response::builder()
                .status(StatusCode::OK)
                .content_type("application/json")
                .body(body)
        }
        Err(e) => {
            let report = Report::new(e).change_context(ApiError::Serialization {
                message: "host priority list".to_string(),
            });
            error_response(report)
        }
    }
}

/// Replace the topology of node `name` with the descriptor in the body.
#[handler]
pub async fn update_node_topology(
    Path(name): Path<String>,
    body: Vec<u8>,
    cache: Data<&Arc<SchedulerCache>>,
) -> Response {
    let topology = match Topology::decode(&body) {
        Ok(topology) => topology,
        Err(e) => {
            return error_response(
                e.change_context(ApiError::InvalidTopology { node: name.clone() }),
            );
        }
    };
    debug!(node = %name, devices = topology.len(), "Node topology update");

    match cache
        .add_or_update_host(&name, topology)
        .change_context(ApiError::CacheUpdate { node: name.clone() })
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(report) => error_response(report),
    }
}

/// Reserved for operational tooling.
#[handler]
pub fn version() -> StatusCode {
    StatusCode::OK
}

fn error_response(report: Report<ApiError>) -> Response {
    error!("Request failed: {report:?}");
    Json(ErrorResponse::new(report.current_context()))
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}
