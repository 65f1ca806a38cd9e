//! Translator — turns a topology node into a [`LaunchDescriptor`].
//!
//! Defaults are filled back onto the node so that a second translation of
//! the same node yields an identical descriptor. Apart from those defaults
//! and the node UUID, translation does not mutate the node.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use topo_core::EngineConfig;
use topogrid_graph::{Node, Topology};

use crate::descriptor::{
    AgentDescriptor, ChannelDescriptor, DriveConfig, LaunchDescriptor, NicConfig, VcpuConfig,
};
use crate::error::{TranslateError, TranslateResult};

pub const DEFAULT_INTERFACE_TYPE: &str = "tap";
pub const DEFAULT_INTERFACE_DRIVER: &str = "virtio-net-pci";
pub const DEFAULT_DRIVE_INTERFACE: &str = "virtio";
pub const DEFAULT_DRIVE_CACHE: &str = "writeback";
pub const DEFAULT_CPU_MODEL: &str = "qemu64";
pub const DEFAULT_VGA: &str = "std";
pub const DEFAULT_MEMORY_MB: u32 = 512;
pub const DEFAULT_POWER_STATE: &str = "running";
pub const DEFAULT_COSCHEDULE: i32 = -1;

/// File name of the guest agent channel socket.
pub const SERIAL_SOCKET: &str = "virtio-serial0";
/// Port name the guest sees for the agent channel.
pub const SERIAL_PORT_NAME: &str = "org.qemu.guest_agent.0";
const QMP_SOCKET: &str = "qmp";

#[derive(Debug, Clone)]
pub struct TranslateConfig {
    /// Backend working directory.
    pub base_dir: PathBuf,
    pub namespace: String,
    pub image_store: String,
    pub agent_binary: String,
    /// Warn instead of failing when a scheduled node has no guest channel.
    pub allow_unreachable_schedules: bool,
}

impl TranslateConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            base_dir: config.backend.base_dir.clone(),
            namespace: config.backend.namespace.clone(),
            image_store: config.backend.image_store.clone(),
            agent_binary: config.agent.binary.clone(),
            allow_unreachable_schedules: config.translate.allow_unreachable_schedules,
        }
    }

    fn instance_dir(&self, uuid: &Uuid) -> PathBuf {
        self.base_dir
            .join("namespaces")
            .join(&self.namespace)
            .join(uuid.to_string())
    }
}

pub struct Translator {
    config: TranslateConfig,
}

impl Translator {
    pub fn new(config: TranslateConfig) -> Self {
        Self { config }
    }

    /// Translate every node of a topology, in node order.
    pub fn translate_all(&self, topology: &mut Topology) -> TranslateResult<Vec<LaunchDescriptor>> {
        topology
            .nodes_mut()
            .iter_mut()
            .map(|node| self.translate(node))
            .collect()
    }

    /// Build the launch descriptor for one node.
    pub fn translate(&self, node: &mut Node) -> TranslateResult<LaunchDescriptor> {
        let name = node.name().to_string();

        let architecture = node
            .vm
            .architecture
            .clone()
            .ok_or_else(|| TranslateError::MissingArchitecture { node: name.clone() })?;
        let image = node
            .vm
            .image
            .clone()
            .ok_or_else(|| TranslateError::MissingImage { node: name.clone() })?;
        if node.vm.drives.is_empty() {
            return Err(TranslateError::MissingBootDrive { node: name });
        }

        self.apply_defaults(node);

        let nics = self.nic_configs(node)?;
        let drives = self.drive_configs(node)?;
        let vcpu = VcpuConfig {
            model: node.vm.cpu.model.clone().unwrap_or_default(),
            sockets: node.vm.cpu.sockets.unwrap_or(1),
            cores: node.vm.cpu.cores.unwrap_or(1),
            threads: node.vm.cpu.threads.unwrap_or(1),
        };
        if vcpu.count().is_none_or(|count| count == 0) {
            return Err(TranslateError::InvalidVcpuTopology {
                node: name,
                sockets: vcpu.sockets,
                cores: vcpu.cores,
                threads: vcpu.threads,
            });
        }

        let uuid = node.ensure_uuid();
        node.schedule
            .resolve()
            .map_err(|source| TranslateError::Resolution {
                node: name.clone(),
                source,
            })?;
        let (comm_channel, agent) = self.agent_wiring(node, &uuid)?;

        let descriptor = LaunchDescriptor {
            uuid,
            name: name.clone(),
            node_type: node.node_type,
            engine: node.engine,
            architecture,
            image,
            memory_mb: node.vm.memory.unwrap_or(DEFAULT_MEMORY_MB),
            vcpu,
            vga: node.vm.vga.clone().unwrap_or_default(),
            drives,
            nics,
            control_ip: node.control_ip,
            default_gateway: node.default_gateway,
            power_state: node
                .vm
                .power_state
                .clone()
                .unwrap_or_else(|| DEFAULT_POWER_STATE.to_string()),
            coschedule: node.coschedule.unwrap_or(DEFAULT_COSCHEDULE),
            tags: node.tags.clone(),
            qemu_append: self.qemu_append(node),
            qmp: ChannelDescriptor {
                name: QMP_SOCKET.to_string(),
                path: self.config.instance_dir(&uuid).join(QMP_SOCKET),
            },
            comm_channel,
            agent,
        };

        // Surface tag conflicts now rather than at registration.
        descriptor.endpoint_properties()?;

        debug!(
            node = %name,
            %uuid,
            nics = descriptor.nics.len(),
            drives = descriptor.drives.len(),
            "node translated"
        );
        Ok(descriptor)
    }

    /// Write missing optional fields back onto the node.
    fn apply_defaults(&self, node: &mut Node) {
        for iface in node.interfaces.iter_mut() {
            iface
                .kind
                .get_or_insert_with(|| DEFAULT_INTERFACE_TYPE.to_string());
            iface
                .driver
                .get_or_insert_with(|| DEFAULT_INTERFACE_DRIVER.to_string());
        }
        for drive in &mut node.vm.drives {
            drive
                .interface
                .get_or_insert_with(|| DEFAULT_DRIVE_INTERFACE.to_string());
            drive
                .cache
                .get_or_insert_with(|| DEFAULT_DRIVE_CACHE.to_string());
        }
        let cpu = &mut node.vm.cpu;
        cpu.model.get_or_insert_with(|| DEFAULT_CPU_MODEL.to_string());
        cpu.sockets.get_or_insert(1);
        cpu.cores.get_or_insert(1);
        cpu.threads.get_or_insert(1);
        node.vm.vga.get_or_insert_with(|| DEFAULT_VGA.to_string());
    }

    fn nic_configs(&self, node: &Node) -> TranslateResult<Vec<NicConfig>> {
        let missing = |interface: &str, field: &'static str| TranslateError::MissingInterfaceField {
            node: node.name().to_string(),
            interface: interface.to_string(),
            field,
        };
        node.interfaces
            .iter()
            .map(|iface| {
                Ok(NicConfig {
                    name: iface.name.clone(),
                    segment: iface.segment.clone(),
                    kind: iface.kind.clone().ok_or_else(|| missing(&iface.name, "type"))?,
                    driver: iface
                        .driver
                        .clone()
                        .ok_or_else(|| missing(&iface.name, "driver"))?,
                    mac: iface.mac.clone().ok_or_else(|| missing(&iface.name, "mac"))?,
                    qos: iface.qos.clone(),
                    address: iface
                        .address
                        .zip(iface.prefix_len)
                        .map(|(addr, prefix)| format!("{addr}/{prefix}")),
                    network: iface.network_string(),
                })
            })
            .collect()
    }

    fn drive_configs(&self, node: &Node) -> TranslateResult<Vec<DriveConfig>> {
        let missing = |drive: usize, field: &'static str| TranslateError::MissingDriveField {
            node: node.name().to_string(),
            drive,
            field,
        };
        node.vm
            .drives
            .iter()
            .enumerate()
            .map(|(index, drive)| {
                Ok(DriveConfig {
                    file: drive.file.clone(),
                    path: Path::new(&self.config.image_store).join(&drive.file),
                    db_path: drive.db_path.clone(),
                    interface: drive
                        .interface
                        .clone()
                        .ok_or_else(|| missing(index, "interface"))?,
                    cache: drive.cache.clone().ok_or_else(|| missing(index, "cache"))?,
                })
            })
            .collect()
    }

    /// Derive the guest channel and agent process for a scheduled node.
    fn agent_wiring(
        &self,
        node: &Node,
        uuid: &Uuid,
    ) -> TranslateResult<(Option<ChannelDescriptor>, Option<AgentDescriptor>)> {
        if node.schedule.is_empty() {
            return Ok((None, None));
        }
        if !node.engine.has_serial_channel() {
            if self.config.allow_unreachable_schedules {
                warn!(
                    node = %node.name(),
                    engine = node.engine.backend_name(),
                    "schedule will not be delivered: engine has no guest channel"
                );
                return Ok((None, None));
            }
            return Err(TranslateError::UnreachableSchedule {
                node: node.name().to_string(),
            });
        }

        let channel = ChannelDescriptor {
            name: SERIAL_PORT_NAME.to_string(),
            path: self.config.instance_dir(uuid).join(SERIAL_SOCKET),
        };
        let agent = AgentDescriptor {
            kind: "Process".to_string(),
            engine: node.engine.backend_name().to_string(),
            uuid: Uuid::new_v5(uuid, b"agent"),
            vm_name: node.name().to_string(),
            vm_uuid: *uuid,
            binary_name: self.config.agent_binary.clone(),
            path: channel.path.clone(),
        };
        Ok((Some(channel), Some(agent)))
    }

    /// Render extra QEMU arguments as `-key value` pairs, BIOS included.
    fn qemu_append(&self, node: &Node) -> String {
        let mut args = node.vm.qemu_append.clone();
        if let Some(bios) = &node.vm.bios {
            let path = Path::new(&self.config.image_store).join(bios);
            args.insert("bios".to_string(), path.display().to_string());
        }
        args.iter()
            .map(|(key, value)| format!("-{key} {value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use topo_core::{Engine, NodeType};
    use topogrid_graph::{DriveSpec, Interface, Qos};
    use topogrid_schedule::Content;

    use super::*;

    fn config() -> TranslateConfig {
        TranslateConfig {
            base_dir: PathBuf::from("/tmp/minimega"),
            namespace: "lab".to_string(),
            image_store: "images".to_string(),
            agent_binary: "/usr/local/bin/topogrid-agent".to_string(),
            allow_unreachable_schedules: false,
        }
    }

    fn vm_node(name: &str) -> Node {
        let mut node = Node::new(name, NodeType::Host).unwrap();
        node.vm.architecture = Some("x86_64".to_string());
        node.vm.image = Some("ubuntu".to_string());
        node.vm.drives.push(DriveSpec::new("ubuntu.qcow2"));
        node
    }

    #[test]
    fn missing_architecture_is_fatal() {
        let mut node = vm_node("h1");
        node.vm.architecture = None;
        let err = Translator::new(config()).translate(&mut node).unwrap_err();
        assert!(matches!(err, TranslateError::MissingArchitecture { ref node } if node == "h1"));
    }

    #[test]
    fn first_drive_is_boot_image() {
        let mut node = vm_node("h1");
        node.vm.drives.push(DriveSpec::new("data.qcow2"));
        let desc = Translator::new(config()).translate(&mut node).unwrap();
        assert_eq!(desc.boot_drive().unwrap().file, "ubuntu.qcow2");
        assert_eq!(desc.drives[0].path, PathBuf::from("images/ubuntu.qcow2"));
        let props = desc.endpoint_properties().unwrap();
        assert_eq!(props["image"], "ubuntu.qcow2");
        assert_eq!(
            props["disks"],
            "images/ubuntu.qcow2,virtio,writeback images/data.qcow2,virtio,writeback"
        );
    }

    #[test]
    fn defaults_fill_once_and_translation_is_stable() {
        let mut node = vm_node("h1");
        for mac in ["00:00:00:00:00:01", "00:00:00:00:00:02"] {
            node.interfaces.add(
                Interface::new("lan")
                    .with_address(Ipv4Addr::new(10, 0, 0, 1), 24)
                    .with_mac(mac),
            );
        }
        let translator = Translator::new(config());
        let first = translator.translate(&mut node).unwrap();
        let second = translator.translate(&mut node).unwrap();

        assert!(first.nics.iter().all(|n| n.driver == DEFAULT_INTERFACE_DRIVER));
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(node.vm.cpu.model.as_deref(), Some(DEFAULT_CPU_MODEL));
        assert_eq!(node.vm.vga.as_deref(), Some(DEFAULT_VGA));
    }

    #[test]
    fn missing_mac_names_interface() {
        let mut node = vm_node("h1");
        node.interfaces.add(Interface::new("lan").with_qos(Qos::default()));
        let err = Translator::new(config()).translate(&mut node).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::MissingInterfaceField { ref interface, field: "mac", .. }
                if interface == "eth0"
        ));
    }

    #[test]
    fn vcpu_count_is_product() {
        let mut node = vm_node("h1");
        node.vm.cpu.sockets = Some(2);
        node.vm.cpu.cores = Some(4);
        let desc = Translator::new(config()).translate(&mut node).unwrap();
        assert_eq!(desc.vcpu.count(), Some(8));
        let props = desc.endpoint_properties().unwrap();
        assert_eq!(props["vcpus"], "8");
        assert_eq!(props["smp_sockets"], "2");
        assert_eq!(props["smp_cores"], "4");
        assert_eq!(props["vga_model"], DEFAULT_VGA);
    }

    #[test]
    fn overflowing_vcpu_topology_is_rejected() {
        let mut node = vm_node("h1");
        node.vm.cpu.sockets = Some(u32::MAX);
        node.vm.cpu.cores = Some(2);
        let err = Translator::new(config()).translate(&mut node).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::InvalidVcpuTopology { ref node, sockets: u32::MAX, cores: 2, threads: 1 }
                if node == "h1"
        ));

        let mut node = vm_node("h2");
        node.vm.cpu.threads = Some(0);
        assert!(matches!(
            Translator::new(config()).translate(&mut node),
            Err(TranslateError::InvalidVcpuTopology { threads: 0, .. })
        ));
    }

    #[test]
    fn container_node_launches_as_container() {
        let mut node = vm_node("c1");
        node.engine = Engine::Container;
        let desc = Translator::new(config()).translate(&mut node).unwrap();
        let props = desc.endpoint_properties().unwrap();
        assert_eq!(props["type"], "container");
        assert_eq!(props["filesystem"], "images/ubuntu.qcow2");
        for kvm_only in ["disks", "vga_model", "smp_sockets", "qemu_append"] {
            assert!(!props.contains_key(kvm_only), "{kvm_only} set on container");
        }

        let desc = Translator::new(config()).translate(&mut vm_node("h1")).unwrap();
        assert_eq!(desc.endpoint_properties().unwrap()["type"], "kvm");
    }

    #[test]
    fn scheduled_qemu_node_gets_agent() {
        let mut node = vm_node("h1");
        node.drop_content(5.0, "/tmp/x.txt", Content::literal("x"), false, false)
            .unwrap();
        let desc = Translator::new(config()).translate(&mut node).unwrap();
        let uuid = desc.uuid.to_string();
        let channel = desc.comm_channel.unwrap();
        assert_eq!(
            channel.path,
            PathBuf::from(format!("/tmp/minimega/namespaces/lab/{uuid}/virtio-serial0"))
        );
        let agent = desc.agent.unwrap();
        assert_eq!(agent.engine, "QemuVM");
        assert_eq!(agent.path, channel.path);
        assert!(agent.to_json().unwrap().contains("\"type\":\"Process\""));
    }

    #[test]
    fn unscheduled_node_has_no_agent() {
        let mut node = vm_node("h1");
        let desc = Translator::new(config()).translate(&mut node).unwrap();
        assert!(desc.agent.is_none());
        assert!(desc.comm_channel.is_none());
        assert!(desc.qmp.path.ends_with("qmp"));
    }

    #[test]
    fn unreachable_schedule_is_an_error_by_default() {
        let mut node = vm_node("c1");
        node.engine = Engine::Container;
        node.set_break(10.0).unwrap();
        let err = Translator::new(config()).translate(&mut node).unwrap_err();
        assert!(matches!(err, TranslateError::UnreachableSchedule { .. }));

        let lenient = Translator::new(TranslateConfig {
            allow_unreachable_schedules: true,
            ..config()
        });
        let desc = lenient.translate(&mut node).unwrap();
        assert!(desc.agent.is_none());
    }

    #[test]
    fn default_gateway_is_carried_to_endpoint() {
        let mut node = vm_node("h1");
        node.default_gateway = Some(Ipv4Addr::new(10, 0, 0, 1));
        let desc = Translator::new(config()).translate(&mut node).unwrap();
        assert_eq!(desc.default_gateway, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(desc.endpoint_properties().unwrap()["default_gateway"], "10.0.0.1");

        let desc = Translator::new(config()).translate(&mut vm_node("h2")).unwrap();
        assert!(!desc.endpoint_properties().unwrap().contains_key("default_gateway"));
    }

    #[test]
    fn failing_content_aborts_node() {
        let mut node = vm_node("h1");
        node.drop_content(
            1.0,
            "/etc/hosts.txt",
            Content::deferred(|| Err("boom".into())),
            false,
            false,
        )
        .unwrap();
        let err = Translator::new(config()).translate(&mut node).unwrap_err();
        assert!(matches!(err, TranslateError::Resolution { ref node, .. } if node == "h1"));
    }

    #[test]
    fn tag_conflict_is_rejected() {
        let mut node = vm_node("h1");
        node.tags.insert("memory".to_string(), "huge".to_string());
        let err = Translator::new(config()).translate(&mut node).unwrap_err();
        assert!(matches!(err, TranslateError::TagConflict { ref tag, .. } if tag == "memory"));
    }

    #[test]
    fn bios_renders_into_append_string() {
        let mut node = vm_node("h1");
        node.vm.bios = Some("seabios.bin".to_string());
        node.vm
            .qemu_append
            .insert("k".to_string(), "en-us".to_string());
        let desc = Translator::new(config()).translate(&mut node).unwrap();
        assert_eq!(desc.qemu_append, "-bios images/seabios.bin -k en-us");
    }
}
