//! Scheduler extender HTTP API
//!
//! # API Endpoints
//!
//! - `POST /topo-scheduler/priority` - Score candidate nodes for a pod
//! - `POST /nodes/:name` - Replace the topology of a node
//! - `GET /version` - Reserved for operational tooling
//!
//! A priority request always answers 200 with a (possibly empty) JSON list
//! of `{"Host": ..., "Score": ...}`. Failures that reach the caller use HTTP
//! 500 with a body of the form:
//! ```json
//! {"error": "..."}
//! ```

use core::error::Error;

pub mod handlers;
pub mod server;

pub use handlers::routes;
pub use server::ApiServer;

/// API errors
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("Invalid topology descriptor for node {node}")]
    InvalidTopology { node: String },
    #[display("Failed to update topology of node {node}")]
    CacheUpdate { node: String },
    #[display("Failed to serialize response: {message}")]
    Serialization { message: String },
    #[display("Server error: {message}")]
    ServerError { message: String },
}

impl Error for ApiError {}
