//! Topology — switches, nodes and the links between them.

use std::net::Ipv4Addr;

use tracing::{debug, info};

use topo_core::config::{InterfaceConfig, NodeConfig, ScheduleEntryConfig, VmConfig};
use topo_core::{NodeType, TopologyConfig};
use topogrid_schedule::{Arguments, Content};

use crate::capability::Capability;
use crate::error::{GraphError, GraphResult};
use crate::interface::{Interface, Qos, parse_address, parse_netmask};
use crate::mac::MacAllocator;
use crate::node::{CpuSpec, DriveSpec, Node, VmSpec};

pub const CONTROL_NETWORK_NAME: &str = "CTRLNET";
const CONTROL_NETWORK: Ipv4Addr = Ipv4Addr::new(172, 16, 0, 0);
const CONTROL_PREFIX: u8 = 16;

/// An L2 segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub name: String,
}

/// Management network attaching every node to the cluster head.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlNetwork {
    pub name: String,
    pub network: Ipv4Addr,
    pub prefix_len: u8,
    /// Address of the head node on this network.
    pub host_addr: Ipv4Addr,
}

impl ControlNetwork {
    /// Head node address in CIDR form, e.g. `172.16.255.254/16`.
    pub fn host_cidr(&self) -> String {
        format!("{}/{}", self.host_addr, self.prefix_len)
    }
}

#[derive(Debug, Default)]
pub struct Topology {
    pub name: String,
    switches: Vec<Switch>,
    nodes: Vec<Node>,
    control_network: Option<ControlNetwork>,
}

impl Topology {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    // ── Construction ───────────────────────────────────────────

    pub fn add_switch(&mut self, name: &str) -> GraphResult<()> {
        if self.switch(name).is_some() {
            return Err(GraphError::DuplicateSwitch(name.to_string()));
        }
        self.switches.push(Switch {
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn add_node(&mut self, node: Node) -> GraphResult<()> {
        if self.node(node.name()).is_some() {
            return Err(GraphError::DuplicateNode(node.name().to_string()));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Attach `node` to `switch` with an IP address.
    pub fn connect(
        &mut self,
        node: &str,
        switch: &str,
        address: Ipv4Addr,
        prefix_len: u8,
        qos: Qos,
    ) -> GraphResult<String> {
        let interface = Interface::new(switch)
            .with_address(address, prefix_len)
            .with_qos(qos);
        self.attach(node, interface)
    }

    /// Attach `node` to `switch` without an IP address.
    pub fn l2_connect(&mut self, node: &str, switch: &str, qos: Qos) -> GraphResult<String> {
        self.attach(node, Interface::new(switch).with_qos(qos).l2_only())
    }

    /// Attach a prepared interface, checking that its switch exists.
    pub fn attach(&mut self, node: &str, interface: Interface) -> GraphResult<String> {
        if self.switch(&interface.segment).is_none() {
            return Err(GraphError::UnknownSwitch(interface.segment.clone()));
        }
        let segment = interface.segment.clone();
        let target = self
            .node_mut(node)
            .ok_or_else(|| GraphError::UnknownNode(node.to_string()))?;
        let name = target.interfaces.add(interface);
        debug!(node, %segment, interface = %name, "interface attached");
        Ok(name)
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn switch(&self, name: &str) -> Option<&Switch> {
        self.switches.iter().find(|s| s.name == name)
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.name() == name)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn control_network(&self) -> Option<&ControlNetwork> {
        self.control_network.as_ref()
    }

    // ── Whole-graph passes ─────────────────────────────────────

    /// Add the management switch and connect every node to it.
    ///
    /// Nodes get addresses from 172.16.0.0/16 in order, skipping `.0.1`
    /// and the head node address `172.16.255.254`.
    pub fn insert_control_network(&mut self) -> GraphResult<&ControlNetwork> {
        let base = u32::from(CONTROL_NETWORK);
        let broadcast = base | (u32::MAX >> CONTROL_PREFIX);
        let host_addr = Ipv4Addr::from(broadcast - 1);
        let reserved = [Ipv4Addr::from(base + 1), host_addr];

        self.add_switch(CONTROL_NETWORK_NAME)?;

        let mut candidate = base + 1;
        for node in &mut self.nodes {
            let address = loop {
                if candidate >= broadcast {
                    return Err(GraphError::ControlNetworkExhausted);
                }
                let address = Ipv4Addr::from(candidate);
                candidate += 1;
                if !reserved.contains(&address) {
                    break address;
                }
            };
            node.control_ip = Some(address);
            node.interfaces.add(
                Interface::new(CONTROL_NETWORK_NAME)
                    .with_address(address, CONTROL_PREFIX)
                    .control(),
            );
        }
        info!(nodes = self.nodes.len(), "control network inserted");

        Ok(&*self.control_network.insert(ControlNetwork {
            name: CONTROL_NETWORK_NAME.to_string(),
            network: CONTROL_NETWORK,
            prefix_len: CONTROL_PREFIX,
            host_addr,
        }))
    }

    /// Give every interface without a MAC a unique one.
    pub fn assign_macs(&mut self, allocator: &mut MacAllocator) -> GraphResult<usize> {
        for node in &self.nodes {
            for mac in node.interfaces.iter().filter_map(|i| i.mac.as_deref()) {
                allocator.reserve(mac)?;
            }
        }
        let mut assigned = 0;
        for node in &mut self.nodes {
            for interface in node.interfaces.iter_mut().filter(|i| i.mac.is_none()) {
                interface.mac = Some(allocator.allocate()?);
                assigned += 1;
            }
        }
        debug!(assigned, "MAC addresses assigned");
        Ok(assigned)
    }

    /// Point hosts at the router sharing their network. Returns hosts updated.
    pub fn assign_default_gateways(&mut self) -> usize {
        let routes: Vec<(String, Ipv4Addr, Interface)> = self
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Router)
            .flat_map(|router| {
                router
                    .interfaces
                    .iter()
                    .filter(|i| !i.is_control && !i.is_l2_only)
                    .filter_map(|i| Some((i.segment.clone(), i.address?, i.clone())))
            })
            .collect();

        let mut updated = 0;
        for host in self.nodes.iter_mut().filter(|n| n.node_type == NodeType::Host) {
            let gateway = routes.iter().find_map(|(segment, router_addr, router_iface)| {
                host.interfaces
                    .iter()
                    .filter(|i| &i.segment == segment)
                    .filter_map(|i| i.address)
                    .any(|addr| router_iface.network_contains(addr))
                    .then_some(*router_addr)
            });
            if let Some(gateway) = gateway {
                host.default_gateway = Some(gateway);
                updated += 1;
            }
        }
        updated
    }

    // ── Config loading ─────────────────────────────────────────

    /// Build a topology from a parsed `topology.toml`.
    pub fn from_config(config: &TopologyConfig) -> GraphResult<Self> {
        let mut topology = Topology::new(&config.experiment.name);
        for switch in &config.switches {
            topology.add_switch(&switch.name)?;
        }
        for node_config in &config.nodes {
            let node = build_node(node_config)?;
            topology.add_node(node)?;
            for iface in &node_config.interfaces {
                topology.attach(&node_config.name, build_interface(iface)?)?;
            }
        }
        if config.experiment.control_network.unwrap_or(false) {
            topology.insert_control_network()?;
        }
        info!(
            name = %topology.name,
            nodes = topology.nodes.len(),
            switches = topology.switches.len(),
            "topology loaded"
        );
        Ok(topology)
    }
}

fn build_node(config: &NodeConfig) -> GraphResult<Node> {
    let mut node = Node::new(&config.name, config.node_type.unwrap_or_default())?;
    if let Some(engine) = config.engine {
        node.engine = engine;
    }
    if let Some(os) = config.os {
        node.add_capability(Capability::Os(os))?;
    }
    if let Some(role) = config.role {
        node.add_capability(Capability::Role(role))?;
    }
    if let Some(vm) = &config.vm {
        node.vm = build_vm(vm);
    }
    node.coschedule = config.coschedule;
    if let Some(tags) = &config.tags {
        node.tags = tags.clone();
    }
    for entry in &config.schedule {
        add_schedule_entry(&mut node, entry)?;
    }
    Ok(node)
}

fn build_vm(config: &VmConfig) -> VmSpec {
    let cpu = config.cpu.clone().unwrap_or_default();
    VmSpec {
        architecture: config.architecture.clone(),
        image: config.image.clone(),
        memory: config.memory,
        vga: config.vga.clone(),
        bios: config.bios.clone(),
        power_state: config.power_state.clone(),
        cpu: CpuSpec {
            model: cpu.model,
            sockets: cpu.sockets,
            cores: cpu.cores,
            threads: cpu.threads,
        },
        drives: config
            .drives
            .iter()
            .map(|d| DriveSpec {
                file: d.file.clone(),
                db_path: d.db_path.clone(),
                interface: d.interface.clone(),
                cache: d.cache.clone(),
            })
            .collect(),
        qemu_append: config.qemu_append.clone().unwrap_or_default(),
    }
}

fn build_interface(config: &InterfaceConfig) -> GraphResult<Interface> {
    let qos = Qos {
        delay: config.delay.clone(),
        rate: config.rate,
        unit: config.unit,
        loss: config.loss,
    };
    let mut interface = Interface::new(&config.switch).with_qos(qos);
    if config.l2_only.unwrap_or(false) {
        interface = interface.l2_only();
    } else if let Some(address) = &config.address {
        let prefix = match &config.netmask {
            Some(mask) => parse_netmask(mask)?,
            None => 32,
        };
        interface = interface.with_address(parse_address(address)?, prefix);
    }
    if let Some(mac) = &config.mac {
        interface = interface.with_mac(mac);
    }
    if let Some(driver) = &config.driver {
        interface = interface.with_driver(driver);
    }
    Ok(interface)
}

fn add_schedule_entry(node: &mut Node, entry: &ScheduleEntryConfig) -> GraphResult<()> {
    match entry {
        ScheduleEntryConfig::Run {
            start_time,
            program,
            arguments,
            resource,
        } => node.run_executable(
            *start_time,
            program,
            arguments.clone().map(Arguments::List),
            resource.unwrap_or(false),
        ),
        ScheduleEntryConfig::DropContent {
            start_time,
            location,
            content,
            executable,
            preload,
        } => node.drop_content(
            *start_time,
            location,
            Content::literal(content.as_str()),
            executable.unwrap_or(false),
            preload.unwrap_or(false),
        ),
        ScheduleEntryConfig::DropFile {
            start_time,
            location,
            filename,
            executable,
            preload,
        } => node.drop_file(
            *start_time,
            location,
            filename,
            executable.unwrap_or(false),
            preload.unwrap_or(false),
        ),
        ScheduleEntryConfig::Transfer {
            location,
            start_time,
            interval,
            destination,
            once,
        } => {
            if once.unwrap_or(false) {
                node.file_transfer_once(location, *start_time, destination.as_deref())
            } else {
                node.file_transfer(location, *interval, *start_time, destination.as_deref())
            }
        }
        ScheduleEntryConfig::Pause {
            start_time,
            duration,
        } => node.set_pause(*start_time, *duration),
        ScheduleEntryConfig::Break { start_time } => node.set_break(*start_time),
        ScheduleEntryConfig::VmResource {
            start_time,
            name,
            dynamic,
            static_file,
        } => node.add_vm_resource(
            *start_time,
            name,
            dynamic.as_deref().map(Content::literal),
            static_file.as_deref(),
        ),
    }
}
