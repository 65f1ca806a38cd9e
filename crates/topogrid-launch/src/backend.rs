//! The deployment backend seam.
//!
//! A backend owns the endpoint/segment graph the orchestrator builds, turns
//! it into a launch command file, starts the instances and reports which of
//! them are running.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

/// Handle of a registered network segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// Name of the segment as the launcher sees it.
    pub fn network_name(&self) -> String {
        format!("network-{}", self.0)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {}", self.0)
    }
}

/// Handle of a registered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint {}", self.0)
    }
}

/// Binding of an endpoint to a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub segment: SegmentId,
    pub attributes: BTreeMap<String, String>,
}

impl Edge {
    pub fn new(segment: SegmentId) -> Self {
        Self {
            segment,
            attributes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub properties: BTreeMap<String, String>,
    /// Bindings in the order they were connected.
    pub edges: Vec<Edge>,
}

impl Endpoint {
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").map(String::as_str)
    }
}

/// One entry of the backend's running inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningInstance {
    pub name: String,
    /// Backend-assigned instance id; names the per-instance directory.
    pub id: String,
    pub host: String,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn insert_network(&self) -> BackendResult<SegmentId>;

    async fn insert_endpoint(
        &self,
        properties: BTreeMap<String, String>,
    ) -> BackendResult<Endpoint>;

    /// Append a binding to `segment` and return the updated endpoint.
    async fn connect_endpoint(
        &self,
        endpoint: EndpointId,
        segment: SegmentId,
    ) -> BackendResult<Endpoint>;

    /// Replace a registered endpoint's properties and edge attributes.
    async fn update_endpoint(&self, endpoint: Endpoint) -> BackendResult<Endpoint>;

    /// Write the launch command file for everything registered so far.
    async fn emit_commands(&self, path: &Path) -> BackendResult<()>;

    async fn launch(&self, path: &Path) -> BackendResult<()>;

    /// Running instances keyed by name.
    async fn list_running_instances(&self) -> BackendResult<BTreeMap<String, RunningInstance>>;

    /// Give the host an address on `segment`.
    async fn create_tap(&self, segment: SegmentId, host_cidr: &str) -> BackendResult<()>;

    async fn spawn_process(&self, command: &str) -> BackendResult<()>;

    fn head_node(&self) -> &str;

    /// Directory that holds one subdirectory per running instance id.
    fn instance_root(&self) -> &Path;
}
