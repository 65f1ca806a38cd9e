//! Launch orchestrator — drives a topology from translation to running
//! agents.
//!
//! One `deploy` call walks the phases in order and stops at the first
//! error. Nothing already registered or launched is rolled back.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use topo_core::EngineConfig;
use topogrid_graph::Topology;
use topogrid_translate::{AgentDescriptor, LaunchDescriptor, Translator};

use crate::backend::{Backend, EndpointId, RunningInstance, SegmentId};
use crate::convergence::{ConvergencePoller, Sleeper, TokioSleeper};
use crate::error::{LaunchError, LaunchResult};
use crate::preflight::{self, HostProbe, VirtualizationProbe};
use crate::spawn::SpawnInstruction;

/// Name of the command file written into the output directory.
pub const COMMAND_FILE: &str = "launch.mm";

/// Current phase of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LaunchPhase {
    Pending,
    /// Host virtualization and testbed checks.
    Preflight,
    Translating,
    /// Segments and endpoints are being registered with the backend.
    Registering,
    Launching,
    AwaitingConvergence,
    SpawningAgents,
    Complete,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub output_dir: PathBuf,
    pub require_empty_testbed: bool,
    pub check_virtualization: bool,
    /// Host bridge recorded on every edge.
    pub bridge: String,
    pub interpreter: Option<String>,
}

impl LaunchConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.launch.poll_interval_ms),
            max_attempts: config.launch.max_attempts,
            output_dir: config.launch.output_dir.clone(),
            require_empty_testbed: config.launch.require_empty_testbed,
            check_virtualization: config.launch.check_virtualization,
            bridge: config.backend.bridge.clone(),
            interpreter: config.agent.interpreter.clone(),
        }
    }
}

/// An agent that could not be started. Other nodes are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnFailure {
    pub node: String,
    pub reason: String,
}

/// What a successful deployment did.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub segments: BTreeMap<String, SegmentId>,
    pub endpoints: BTreeMap<String, EndpointId>,
    pub instances: BTreeMap<String, RunningInstance>,
    pub descriptors: Vec<LaunchDescriptor>,
    pub spawned: Vec<SpawnInstruction>,
    pub spawn_failures: Vec<SpawnFailure>,
    pub command_file: PathBuf,
}

pub struct Orchestrator<B> {
    backend: B,
    translator: Translator,
    config: LaunchConfig,
    sleeper: Arc<dyn Sleeper>,
    probe: Arc<dyn VirtualizationProbe>,
    phase: LaunchPhase,
}

impl<B: Backend> Orchestrator<B> {
    pub fn new(backend: B, translator: Translator, config: LaunchConfig) -> Self {
        Self {
            backend,
            translator,
            config,
            sleeper: Arc::new(TokioSleeper),
            probe: Arc::new(HostProbe),
            phase: LaunchPhase::Pending,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn VirtualizationProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn phase(&self) -> &LaunchPhase {
        &self.phase
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Deploy `topology`. Nodes are translated in place, so defaults and
    /// UUIDs assigned along the way remain visible to the caller.
    pub async fn deploy(&mut self, topology: &mut Topology) -> LaunchResult<LaunchReport> {
        match self.run(topology).await {
            Ok(report) => {
                self.enter(LaunchPhase::Complete);
                info!(
                    topology = %topology.name,
                    nodes = report.endpoints.len(),
                    agents = report.spawned.len(),
                    failed_agents = report.spawn_failures.len(),
                    "deployment complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.enter(LaunchPhase::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&mut self, topology: &mut Topology) -> LaunchResult<LaunchReport> {
        self.enter(LaunchPhase::Preflight);
        if self.config.check_virtualization {
            preflight::check_virtualization(self.probe.as_ref()).await?;
        }
        if self.config.require_empty_testbed {
            preflight::ensure_testbed_available(&self.backend).await?;
        }

        self.enter(LaunchPhase::Translating);
        let descriptors = self.translator.translate_all(topology)?;

        self.enter(LaunchPhase::Registering);
        let control = topology.control_network().map(|c| c.name.as_str());
        let segments = self.register_segments(&descriptors, control).await?;
        let mut endpoints = BTreeMap::new();
        for descriptor in &descriptors {
            let id = self.register_node(descriptor, &segments).await?;
            endpoints.insert(descriptor.name.clone(), id);
        }

        self.enter(LaunchPhase::Launching);
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let command_file = self.config.output_dir.join(COMMAND_FILE);
        self.backend.emit_commands(&command_file).await?;
        self.backend.launch(&command_file).await?;

        self.enter(LaunchPhase::AwaitingConvergence);
        let poller = ConvergencePoller::new(self.config.poll_interval, self.config.max_attempts);
        let instances = poller
            .wait(&self.backend, self.sleeper.as_ref(), descriptors.len())
            .await?;

        if let Some(control) = topology.control_network() {
            if let Some(segment) = segments.get(&control.name) {
                self.backend
                    .create_tap(*segment, &control.host_cidr())
                    .await?;
            }
        }

        self.enter(LaunchPhase::SpawningAgents);
        let mut spawned = Vec::new();
        let mut spawn_failures = Vec::new();
        for descriptor in &descriptors {
            let Some(agent) = &descriptor.agent else {
                continue;
            };
            match self.spawn_agent(&descriptor.name, agent, &instances).await {
                Ok(instruction) => spawned.push(instruction),
                Err(e) => {
                    warn!(node = %descriptor.name, error = %e, "agent spawn failed");
                    spawn_failures.push(SpawnFailure {
                        node: descriptor.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(LaunchReport {
            segments,
            endpoints,
            instances,
            descriptors,
            spawned,
            spawn_failures,
            command_file,
        })
    }

    fn enter(&mut self, phase: LaunchPhase) {
        debug!(from = ?self.phase, to = ?phase, "launch phase");
        self.phase = phase;
    }

    /// One segment per switch some NIC references, the control network
    /// first.
    async fn register_segments(
        &self,
        descriptors: &[LaunchDescriptor],
        control: Option<&str>,
    ) -> LaunchResult<BTreeMap<String, SegmentId>> {
        let mut order: Vec<&str> = Vec::new();
        for nic in descriptors.iter().flat_map(|d| &d.nics) {
            if !order.contains(&nic.segment.as_str()) {
                order.push(&nic.segment);
            }
        }
        if let Some(position) = control.and_then(|c| order.iter().position(|s| *s == c)) {
            let control = order.remove(position);
            order.insert(0, control);
        }

        let mut segments = BTreeMap::new();
        for name in order {
            let id = self.backend.insert_network().await?;
            debug!(switch = name, segment = id.0, "segment registered");
            segments.insert(name.to_string(), id);
        }
        Ok(segments)
    }

    /// Insert the endpoint, bind each NIC in order, then attach the NIC
    /// attributes to the edges.
    async fn register_node(
        &self,
        descriptor: &LaunchDescriptor,
        segments: &BTreeMap<String, SegmentId>,
    ) -> LaunchResult<EndpointId> {
        let node = &descriptor.name;
        let mut endpoint = self
            .backend
            .insert_endpoint(descriptor.endpoint_properties()?)
            .await?;
        if descriptor.nics.is_empty() {
            debug!(%node, endpoint = endpoint.id.0, "endpoint registered without interfaces");
            return Ok(endpoint.id);
        }

        let mut expected = Vec::with_capacity(descriptor.nics.len());
        for nic in &descriptor.nics {
            let segment = *segments
                .get(&nic.segment)
                .ok_or_else(|| LaunchError::UnknownSegment {
                    node: node.clone(),
                    segment: nic.segment.clone(),
                })?;
            endpoint = self.backend.connect_endpoint(endpoint.id, segment).await?;
            expected.push(segment);
        }

        for (position, (nic, segment)) in descriptor.nics.iter().zip(&expected).enumerate() {
            match endpoint.edges.get_mut(position) {
                Some(edge) if edge.segment == *segment => {
                    let attrs = &mut edge.attributes;
                    attrs.insert("mac".to_string(), nic.mac.clone());
                    attrs.insert("driver".to_string(), nic.driver.clone());
                    attrs.insert("bridge".to_string(), self.config.bridge.clone());
                    attrs.extend(nic.qos_attributes());
                }
                other => {
                    return Err(LaunchError::BindingMismatch {
                        node: node.clone(),
                        position,
                        expected: *segment,
                        found: other.map(|edge| edge.segment),
                    });
                }
            }
        }

        let endpoint = self.backend.update_endpoint(endpoint).await?;
        debug!(%node, endpoint = endpoint.id.0, edges = endpoint.edges.len(), "endpoint registered");
        Ok(endpoint.id)
    }

    /// Point the agent at the socket of the running instance and start it.
    async fn spawn_agent(
        &self,
        node: &str,
        agent: &AgentDescriptor,
        instances: &BTreeMap<String, RunningInstance>,
    ) -> LaunchResult<SpawnInstruction> {
        let instance = instances
            .get(node)
            .ok_or_else(|| LaunchError::MissingInstance {
                node: node.to_string(),
            })?;
        let socket = agent
            .path
            .file_name()
            .unwrap_or(agent.path.as_os_str());
        let mut agent = agent.clone();
        agent.path = self
            .backend
            .instance_root()
            .join(&instance.id)
            .join(socket);

        let instruction = SpawnInstruction::new(
            node,
            &instance.host,
            self.backend.head_node(),
            self.config.interpreter.as_deref(),
            &agent.binary_name,
            agent.to_json()?,
        );
        self.backend
            .spawn_process(&instruction.command_line())
            .await?;
        debug!(%node, host = %instance.host, socket = ?agent.path, "agent spawned");
        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use topo_core::NodeType;
    use topogrid_graph::{DriveSpec, MacAllocator, Node, Qos};
    use topogrid_translate::TranslateConfig;

    use super::*;
    use crate::dry_run::DryRunBackend;
    use crate::testing::{
        CountingSleeper, EdgeFault, FaultyBindingBackend, FixedProbe, ScriptedBackend,
    };

    fn translator() -> Translator {
        Translator::new(TranslateConfig {
            base_dir: PathBuf::from("/tmp/minimega"),
            namespace: "lab".to_string(),
            image_store: "images".to_string(),
            agent_binary: "/usr/local/bin/topogrid-agent".to_string(),
            allow_unreachable_schedules: false,
        })
    }

    fn launch_config(output_dir: &std::path::Path) -> LaunchConfig {
        LaunchConfig {
            poll_interval: Duration::from_millis(500),
            max_attempts: 4,
            output_dir: output_dir.to_path_buf(),
            require_empty_testbed: true,
            check_virtualization: true,
            bridge: "mega_bridge".to_string(),
            interpreter: None,
        }
    }

    fn vm_node(name: &str) -> Node {
        let mut node = Node::new(name, NodeType::Host).unwrap();
        node.vm.architecture = Some("x86_64".to_string());
        node.vm.image = Some("ubuntu".to_string());
        node.vm.drives.push(DriveSpec::new("ubuntu.qcow2"));
        node
    }

    fn lan_topology(hosts: u8) -> Topology {
        let mut topology = Topology::new("lab");
        topology.add_switch("lan").unwrap();
        for i in 1..=hosts {
            let name = format!("host-{i}");
            topology.add_node(vm_node(&name)).unwrap();
            topology
                .connect(&name, "lan", Ipv4Addr::new(10, 0, 0, i), 24, Qos::default())
                .unwrap();
        }
        topology
    }

    fn with_macs(mut topology: Topology) -> Topology {
        topology.assign_macs(&mut MacAllocator::default()).unwrap();
        topology
    }

    fn orchestrator<B: Backend>(backend: B, dir: &std::path::Path) -> Orchestrator<B> {
        Orchestrator::new(backend, translator(), launch_config(dir))
            .with_probe(Arc::new(FixedProbe("Y")))
            .with_sleeper(Arc::new(CountingSleeper::default()))
    }

    #[tokio::test]
    async fn hosts_on_one_switch_share_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut topology = with_macs(lan_topology(3));
        let mut orch = orchestrator(DryRunBackend::new("head", "/tmp/minimega"), dir.path());

        let report = orch.deploy(&mut topology).await.unwrap();

        assert_eq!(orch.phase(), &LaunchPhase::Complete);
        assert_eq!(report.segments.len(), 1);
        assert_eq!(report.endpoints.len(), 3);
        assert_eq!(report.instances.len(), 3);
        let lan = report.segments["lan"];
        let endpoints = orch.backend().endpoints().await;
        assert_eq!(endpoints.len(), 3);
        for endpoint in &endpoints {
            assert_eq!(endpoint.edges.len(), 1);
            assert_eq!(endpoint.edges[0].segment, lan);
            assert_eq!(endpoint.edges[0].attributes["bridge"], "mega_bridge");
            assert!(endpoint.edges[0].attributes.contains_key("mac"));
        }
        assert!(report.command_file.exists());
        assert!(orch.backend().launched().await);
        assert!(report.spawned.is_empty());
    }

    #[tokio::test]
    async fn unreferenced_switch_is_never_registered() {
        let dir = tempfile::tempdir().unwrap();
        let mut topology = lan_topology(2);
        topology.add_switch("unused").unwrap();
        let mut topology = with_macs(topology);
        let mut orch = orchestrator(DryRunBackend::new("head", "/tmp/minimega"), dir.path());

        let report = orch.deploy(&mut topology).await.unwrap();

        let names: Vec<&str> = report.segments.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["lan"]);
        assert_eq!(orch.backend().segments().await, vec![SegmentId(1)]);
    }

    fn dual_homed_router() -> Topology {
        let mut topology = Topology::new("edge");
        topology.add_switch("lan").unwrap();
        topology.add_switch("wan").unwrap();
        topology.add_node(vm_node("gw")).unwrap();
        topology
            .connect("gw", "lan", Ipv4Addr::new(10, 0, 0, 1), 24, Qos::default())
            .unwrap();
        topology
            .connect("gw", "wan", Ipv4Addr::new(192, 168, 1, 1), 24, Qos::default())
            .unwrap();
        with_macs(topology)
    }

    #[tokio::test]
    async fn reordered_edges_are_a_binding_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut topology = dual_homed_router();
        let mut orch = orchestrator(FaultyBindingBackend::new(EdgeFault::Reverse), dir.path());

        let err = orch.deploy(&mut topology).await.unwrap_err();

        assert!(matches!(
            err,
            LaunchError::BindingMismatch {
                ref node,
                position: 0,
                expected: SegmentId(1),
                found: Some(SegmentId(2)),
            } if node == "gw"
        ));
        assert!(matches!(orch.phase(), LaunchPhase::Failed { .. }));
        assert!(!orch.backend().inner().launched().await);
    }

    #[tokio::test]
    async fn missing_edge_is_a_binding_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut topology = dual_homed_router();
        let mut orch = orchestrator(FaultyBindingBackend::new(EdgeFault::DropLast), dir.path());

        let err = orch.deploy(&mut topology).await.unwrap_err();

        assert!(matches!(
            err,
            LaunchError::BindingMismatch {
                position: 1,
                expected: SegmentId(2),
                found: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_virtualization_check_touches_no_backend_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut topology = with_macs(lan_topology(2));
        let mut orch = orchestrator(DryRunBackend::new("head", "/tmp/minimega"), dir.path())
            .with_probe(Arc::new(FixedProbe("N")));

        let err = orch.deploy(&mut topology).await.unwrap_err();

        assert!(matches!(err, LaunchError::VirtualizationUnavailable(_)));
        assert!(matches!(orch.phase(), LaunchPhase::Failed { .. }));
        assert!(orch.backend().segments().await.is_empty());
        assert!(orch.backend().endpoints().await.is_empty());
        assert!(!orch.backend().launched().await);
    }

    #[tokio::test]
    async fn busy_testbed_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut topology = with_macs(lan_topology(1));
        let mut orch = orchestrator(ScriptedBackend::new(vec![Ok(2)]), dir.path());

        let err = orch.deploy(&mut topology).await.unwrap_err();
        assert!(matches!(err, LaunchError::TestbedBusy { running: 2 }));
        assert_eq!(orch.backend().listings(), 1);
    }

    #[tokio::test]
    async fn convergence_timeout_after_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let mut topology = Topology::new("solo");
        topology.add_node(vm_node("lonely")).unwrap();
        let sleeper = Arc::new(CountingSleeper::default());
        let mut orch = orchestrator(ScriptedBackend::new(vec![Ok(0)]), dir.path())
            .with_sleeper(sleeper.clone());

        let err = orch.deploy(&mut topology).await.unwrap_err();

        assert!(matches!(
            err,
            LaunchError::LaunchTimeout {
                expected: 1,
                observed: 0,
                attempts: 4
            }
        ));
        assert_eq!(sleeper.count(), 4);
        // One preflight listing plus one per attempt.
        assert_eq!(orch.backend().listings(), 5);
    }

    #[tokio::test]
    async fn translation_errors_stop_before_registration() {
        let dir = tempfile::tempdir().unwrap();
        // No MACs assigned.
        let mut topology = lan_topology(2);
        let mut orch = orchestrator(DryRunBackend::new("head", "/tmp/minimega"), dir.path());

        let err = orch.deploy(&mut topology).await.unwrap_err();
        assert!(matches!(err, LaunchError::Translate(_)));
        assert!(orch.backend().segments().await.is_empty());
    }

    #[tokio::test]
    async fn scheduled_nodes_get_agents_and_control_tap() {
        let dir = tempfile::tempdir().unwrap();
        let mut topology = lan_topology(2);
        topology
            .node_mut("host-1")
            .unwrap()
            .run_executable(5.0, "/bin/true", None, false)
            .unwrap();
        topology.insert_control_network().unwrap();
        let mut topology = with_macs(topology);
        let mut orch = orchestrator(DryRunBackend::new("head", "/srv/mm"), dir.path());

        let report = orch.deploy(&mut topology).await.unwrap();

        assert_eq!(report.segments["CTRLNET"], SegmentId(1));
        assert_eq!(report.segments["lan"], SegmentId(2));
        assert_eq!(
            orch.backend().taps().await,
            vec![(SegmentId(1), "172.16.255.254/16".to_string())]
        );

        assert_eq!(report.spawned.len(), 1);
        assert!(report.spawn_failures.is_empty());
        let spawn = &report.spawned[0];
        assert_eq!(spawn.node, "host-1");
        let instance_id = &report.instances["host-1"].id;
        let commands = orch.backend().spawned().await;
        let command = &commands[0];
        assert!(command.starts_with("background /usr/local/bin/topogrid-agent '"));
        assert!(command.contains(&format!("/srv/mm/{instance_id}/virtio-serial0")));
    }
}
