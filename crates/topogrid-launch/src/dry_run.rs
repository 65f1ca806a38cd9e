//! A backend that never starts anything.
//!
//! Registration and command rendering behave exactly as they do for the
//! process backend. `launch` marks every registered endpoint as running on
//! the head node, and spawned commands and taps are recorded for
//! inspection. Used by `topogridd plan` and by tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::{Backend, Endpoint, EndpointId, RunningInstance, SegmentId};
use crate::error::BackendResult;
use crate::registry::Registry;

#[derive(Debug, Default)]
struct Recorded {
    launched: bool,
    spawned: Vec<String>,
    taps: Vec<(SegmentId, String)>,
}

#[derive(Debug)]
pub struct DryRunBackend {
    head_node: String,
    instance_root: PathBuf,
    registry: Mutex<Registry>,
    recorded: Mutex<Recorded>,
}

impl DryRunBackend {
    pub fn new(head_node: &str, instance_root: impl Into<PathBuf>) -> Self {
        Self {
            head_node: head_node.to_string(),
            instance_root: instance_root.into(),
            registry: Mutex::new(Registry::new()),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.registry.lock().await.endpoints().cloned().collect()
    }

    pub async fn segments(&self) -> Vec<SegmentId> {
        self.registry.lock().await.segments().to_vec()
    }

    pub async fn render_commands(&self) -> String {
        self.registry.lock().await.render_commands()
    }

    pub async fn spawned(&self) -> Vec<String> {
        self.recorded.lock().await.spawned.clone()
    }

    pub async fn taps(&self) -> Vec<(SegmentId, String)> {
        self.recorded.lock().await.taps.clone()
    }

    pub async fn launched(&self) -> bool {
        self.recorded.lock().await.launched
    }
}

#[async_trait]
impl Backend for DryRunBackend {
    async fn insert_network(&self) -> BackendResult<SegmentId> {
        Ok(self.registry.lock().await.insert_network())
    }

    async fn insert_endpoint(
        &self,
        properties: BTreeMap<String, String>,
    ) -> BackendResult<Endpoint> {
        Ok(self.registry.lock().await.insert_endpoint(properties))
    }

    async fn connect_endpoint(
        &self,
        endpoint: EndpointId,
        segment: SegmentId,
    ) -> BackendResult<Endpoint> {
        self.registry.lock().await.connect_endpoint(endpoint, segment)
    }

    async fn update_endpoint(&self, endpoint: Endpoint) -> BackendResult<Endpoint> {
        self.registry.lock().await.update_endpoint(endpoint)
    }

    async fn emit_commands(&self, path: &Path) -> BackendResult<()> {
        let script = self.registry.lock().await.render_commands();
        tokio::fs::write(path, script).await?;
        debug!(?path, "dry-run command file written");
        Ok(())
    }

    async fn launch(&self, path: &Path) -> BackendResult<()> {
        self.recorded.lock().await.launched = true;
        info!(?path, "dry run: launch skipped");
        Ok(())
    }

    async fn list_running_instances(&self) -> BackendResult<BTreeMap<String, RunningInstance>> {
        if !self.recorded.lock().await.launched {
            return Ok(BTreeMap::new());
        }
        let registry = self.registry.lock().await;
        Ok(registry
            .endpoints()
            .filter_map(|ep| {
                let name = ep.name()?.to_string();
                let instance = RunningInstance {
                    name: name.clone(),
                    id: ep.id.0.to_string(),
                    host: self.head_node.clone(),
                };
                Some((name, instance))
            })
            .collect())
    }

    async fn create_tap(&self, segment: SegmentId, host_cidr: &str) -> BackendResult<()> {
        self.recorded
            .lock()
            .await
            .taps
            .push((segment, host_cidr.to_string()));
        Ok(())
    }

    async fn spawn_process(&self, command: &str) -> BackendResult<()> {
        self.recorded.lock().await.spawned.push(command.to_string());
        Ok(())
    }

    fn head_node(&self) -> &str {
        &self.head_node
    }

    fn instance_root(&self) -> &Path {
        &self.instance_root
    }
}
