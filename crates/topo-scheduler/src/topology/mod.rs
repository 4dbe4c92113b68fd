//! Accelerator interconnect topology of a single host.
//!
//! A [`Topology`] is decoded from the descriptor published by the node-level
//! discovery agent, either through the host annotation or the update endpoint.
//! Snapshots are immutable and get replaced wholesale on every update.

use core::error::Error;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use serde::Serialize;

pub mod link;

pub use link::P2PLinkType;

/// Host annotation carrying the JSON topology descriptor.
pub const TOPOLOGY_ANNOTATION: &str = "nvidia.com/gpu-topo";

/// Errors raised while reading a topology descriptor.
#[derive(Debug, derive_more::Display)]
pub enum TopologyError {
    #[display("Failed to decode topology descriptor: {message}")]
    Decode { message: String },
}

impl Error for TopologyError {}

/// Link from the owning device to the device at the same row index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2PLink {
    #[serde(rename = "BusID", default)]
    pub bus_id: String,
    #[serde(rename = "Link", default)]
    pub link: P2PLinkType,
}

/// One accelerator device and its row of the adjacency matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "Path", default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "Model", default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Entry `j` describes the link to the device at index `j`
    #[serde(rename = "Topology", default)]
    pub links: Vec<P2PLink>,
}

impl Device {
    /// Sum of link scores towards devices with a higher index than `index`.
    ///
    /// Only the upper triangle of the matrix is read so that each pair is
    /// counted once.
    pub fn upper_link_score(&self, index: usize) -> i64 {
        self.links
            .iter()
            .skip(index + 1)
            .map(|link| link.link.score())
            .sum()
    }
}

/// Ordered device list of one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(rename = "GPUDevice", default)]
    pub devices: Vec<Device>,
}

impl Topology {
    /// Decode a topology descriptor.
    ///
    /// # Errors
    ///
    /// - [`TopologyError::Decode`] if the payload is not a well-formed descriptor
    pub fn decode(descriptor: &[u8]) -> Result<Self, Report<TopologyError>> {
        serde_json::from_slice(descriptor).change_context_lazy(|| TopologyError::Decode {
            message: format!("{} byte descriptor is not valid topology JSON", descriptor.len()),
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.devices.iter().any(|device| device.uuid == uuid)
    }
}
