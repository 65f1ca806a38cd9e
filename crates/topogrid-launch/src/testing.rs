//! Test doubles shared by the unit tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{Backend, Endpoint, EndpointId, RunningInstance, SegmentId};
use crate::convergence::Sleeper;
use crate::dry_run::DryRunBackend;
use crate::error::{BackendError, BackendResult};
use crate::preflight::VirtualizationProbe;

#[derive(Debug, Default)]
pub struct CountingSleeper {
    count: AtomicUsize,
    total: Mutex<Duration>,
}

impl CountingSleeper {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> Duration {
        *self.total.lock().unwrap()
    }
}

#[async_trait]
impl Sleeper for CountingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.total.lock().unwrap() += duration;
    }
}

/// Answers the nested-virtualization probe with a fixed value.
pub struct FixedProbe(pub &'static str);

#[async_trait]
impl VirtualizationProbe for FixedProbe {
    async fn read_param(&self, _path: &str) -> Option<String> {
        Some(self.0.to_string())
    }

    async fn host_validate(&self) -> Option<String> {
        None
    }
}

/// Backend whose inventory follows a script of instance counts; the last
/// step repeats. `Err(())` makes the listing fail.
pub struct ScriptedBackend {
    script: Vec<Result<usize, ()>>,
    listings: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<usize, ()>>) -> Self {
        Self {
            script,
            listings: AtomicUsize::new(0),
        }
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn insert_network(&self) -> BackendResult<SegmentId> {
        Ok(SegmentId(1))
    }

    async fn insert_endpoint(
        &self,
        properties: BTreeMap<String, String>,
    ) -> BackendResult<Endpoint> {
        Ok(Endpoint {
            id: EndpointId(1),
            properties,
            edges: Vec::new(),
        })
    }

    async fn connect_endpoint(
        &self,
        endpoint: EndpointId,
        _segment: SegmentId,
    ) -> BackendResult<Endpoint> {
        Err(BackendError::UnknownEndpoint(endpoint.0))
    }

    async fn update_endpoint(&self, endpoint: Endpoint) -> BackendResult<Endpoint> {
        Ok(endpoint)
    }

    async fn emit_commands(&self, _path: &Path) -> BackendResult<()> {
        Ok(())
    }

    async fn launch(&self, _path: &Path) -> BackendResult<()> {
        Ok(())
    }

    async fn list_running_instances(&self) -> BackendResult<BTreeMap<String, RunningInstance>> {
        let call = self.listings.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(Ok(0));
        let count = step.map_err(|()| BackendError::Response("scripted failure".to_string()))?;
        Ok((0..count)
            .map(|i| {
                let name = format!("vm-{i}");
                let instance = RunningInstance {
                    name: name.clone(),
                    id: i.to_string(),
                    host: "head".to_string(),
                };
                (name, instance)
            })
            .collect())
    }

    async fn create_tap(&self, _segment: SegmentId, _host_cidr: &str) -> BackendResult<()> {
        Ok(())
    }

    async fn spawn_process(&self, _command: &str) -> BackendResult<()> {
        Ok(())
    }

    fn head_node(&self) -> &str {
        "head"
    }

    fn instance_root(&self) -> &Path {
        Path::new("/tmp/minimega")
    }
}

/// How [`FaultyBindingBackend`] corrupts the endpoint returned by a connect.
#[derive(Debug, Clone, Copy)]
pub enum EdgeFault {
    Reverse,
    DropLast,
}

/// Dry-run backend whose connect replies list the edges wrongly.
pub struct FaultyBindingBackend {
    inner: DryRunBackend,
    fault: EdgeFault,
}

impl FaultyBindingBackend {
    pub fn new(fault: EdgeFault) -> Self {
        Self {
            inner: DryRunBackend::new("head", "/tmp/minimega"),
            fault,
        }
    }

    pub fn inner(&self) -> &DryRunBackend {
        &self.inner
    }
}

#[async_trait]
impl Backend for FaultyBindingBackend {
    async fn insert_network(&self) -> BackendResult<SegmentId> {
        self.inner.insert_network().await
    }

    async fn insert_endpoint(
        &self,
        properties: BTreeMap<String, String>,
    ) -> BackendResult<Endpoint> {
        self.inner.insert_endpoint(properties).await
    }

    async fn connect_endpoint(
        &self,
        endpoint: EndpointId,
        segment: SegmentId,
    ) -> BackendResult<Endpoint> {
        let mut endpoint = self.inner.connect_endpoint(endpoint, segment).await?;
        match self.fault {
            EdgeFault::Reverse => endpoint.edges.reverse(),
            EdgeFault::DropLast => {
                endpoint.edges.pop();
            }
        }
        Ok(endpoint)
    }

    async fn update_endpoint(&self, endpoint: Endpoint) -> BackendResult<Endpoint> {
        self.inner.update_endpoint(endpoint).await
    }

    async fn emit_commands(&self, path: &Path) -> BackendResult<()> {
        self.inner.emit_commands(path).await
    }

    async fn launch(&self, path: &Path) -> BackendResult<()> {
        self.inner.launch(path).await
    }

    async fn list_running_instances(&self) -> BackendResult<BTreeMap<String, RunningInstance>> {
        self.inner.list_running_instances().await
    }

    async fn create_tap(&self, segment: SegmentId, host_cidr: &str) -> BackendResult<()> {
        self.inner.create_tap(segment, host_cidr).await
    }

    async fn spawn_process(&self, command: &str) -> BackendResult<()> {
        self.inner.spawn_process(command).await
    }

    fn head_node(&self) -> &str {
        self.inner.head_node()
    }

    fn instance_root(&self) -> &Path {
        self.inner.instance_root()
    }
}
