//! Launch descriptors — everything the backend needs to start one node.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use topo_core::{Engine, NodeType};
use topogrid_graph::Qos;

use crate::error::{TranslateError, TranslateResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcpuConfig {
    pub model: String,
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
}

impl VcpuConfig {
    /// Total virtual CPUs presented to the guest; `None` on overflow.
    pub fn count(&self) -> Option<u32> {
        self.sockets
            .checked_mul(self.cores)?
            .checked_mul(self.threads)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    pub file: String,
    /// Path relative to the backend image store.
    pub path: PathBuf,
    pub db_path: Option<String>,
    pub interface: String,
    pub cache: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicConfig {
    pub name: String,
    /// Switch name; resolved to a registered segment before binding.
    pub segment: String,
    pub kind: String,
    pub driver: String,
    pub mac: String,
    pub qos: Qos,
    pub address: Option<String>,
    pub network: Option<String>,
}

impl NicConfig {
    /// QoS values that are set, rendered as backend edge attributes.
    pub fn qos_attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        if let Some(delay) = &self.qos.delay {
            attrs.insert("delay".to_string(), delay.clone());
        }
        if let Some(rate) = self.qos.rate {
            attrs.insert("rate".to_string(), rate.to_string());
            attrs.insert("unit".to_string(), self.qos.rate_unit().to_string());
        }
        if let Some(loss) = self.qos.loss {
            attrs.insert("loss".to_string(), loss.to_string());
        }
        attrs
    }
}

/// A host-side socket connected to the guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub path: PathBuf,
}

/// How to start the per-node schedule agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub engine: String,
    pub uuid: Uuid,
    pub vm_name: String,
    pub vm_uuid: Uuid,
    pub binary_name: String,
    /// Guest channel socket; rewritten once the backend reports where the
    /// instance actually runs.
    pub path: PathBuf,
}

impl AgentDescriptor {
    /// Compact JSON argument handed to the agent process.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    pub uuid: Uuid,
    pub name: String,
    pub node_type: NodeType,
    pub engine: Engine,
    pub architecture: String,
    pub image: String,
    pub memory_mb: u32,
    pub vcpu: VcpuConfig,
    pub vga: String,
    /// `drives[0]` is the boot image.
    pub drives: Vec<DriveConfig>,
    pub nics: Vec<NicConfig>,
    pub control_ip: Option<Ipv4Addr>,
    /// Router address on a shared network, for in-guest route setup.
    pub default_gateway: Option<Ipv4Addr>,
    pub power_state: String,
    pub coschedule: i32,
    pub tags: BTreeMap<String, String>,
    pub qemu_append: String,
    pub qmp: ChannelDescriptor,
    pub comm_channel: Option<ChannelDescriptor>,
    pub agent: Option<AgentDescriptor>,
}

impl LaunchDescriptor {
    pub fn boot_drive(&self) -> Option<&DriveConfig> {
        self.drives.first()
    }

    /// Flatten into the backend endpoint property map.
    ///
    /// Tags share the namespace of the required keys; a tag that collides
    /// with one is rejected.
    pub fn endpoint_properties(&self) -> TranslateResult<BTreeMap<String, String>> {
        let mut props = BTreeMap::new();
        props.insert("architecture".to_string(), self.architecture.clone());
        props.insert("name".to_string(), self.name.clone());
        props.insert("uuid".to_string(), self.uuid.to_string());
        props.insert(
            "control_ip".to_string(),
            self.control_ip.map(|ip| ip.to_string()).unwrap_or_default(),
        );
        if let Some(gateway) = self.default_gateway {
            props.insert("default_gateway".to_string(), gateway.to_string());
        }
        props.insert("type".to_string(), self.engine.launch_kind().to_string());
        props.insert("memory".to_string(), self.memory_mb.to_string());
        let vcpus = self
            .vcpu
            .count()
            .ok_or_else(|| TranslateError::InvalidVcpuTopology {
                node: self.name.clone(),
                sockets: self.vcpu.sockets,
                cores: self.vcpu.cores,
                threads: self.vcpu.threads,
            })?;
        props.insert("vcpus".to_string(), vcpus.to_string());
        props.insert(
            "image".to_string(),
            self.boot_drive().map(|d| d.file.clone()).unwrap_or_default(),
        );
        match self.engine {
            Engine::Qemu => {
                props.insert("cpu_model".to_string(), self.vcpu.model.clone());
                props.insert("smp_sockets".to_string(), self.vcpu.sockets.to_string());
                props.insert("smp_cores".to_string(), self.vcpu.cores.to_string());
                props.insert("smp_threads".to_string(), self.vcpu.threads.to_string());
                props.insert("vga_model".to_string(), self.vga.clone());
                let disks: Vec<String> = self
                    .drives
                    .iter()
                    .map(|d| format!("{},{},{}", d.path.display(), d.interface, d.cache))
                    .collect();
                props.insert("disks".to_string(), disks.join(" "));
                if let Some(channel) = &self.comm_channel {
                    props.insert("virtio_ports".to_string(), channel.name.clone());
                }
                props.insert("qemu_append".to_string(), self.qemu_append.clone());
            }
            // Containers boot from a root filesystem, not a disk image.
            Engine::Container => {
                props.insert(
                    "filesystem".to_string(),
                    self.boot_drive()
                        .map(|d| d.path.display().to_string())
                        .unwrap_or_default(),
                );
            }
        }
        props.insert("power_state".to_string(), self.power_state.clone());
        props.insert("coschedule".to_string(), self.coschedule.to_string());

        for (key, value) in &self.tags {
            if props.contains_key(key) {
                return Err(TranslateError::TagConflict {
                    node: self.name.clone(),
                    tag: key.clone(),
                });
            }
            props.insert(key.clone(), value.clone());
        }
        Ok(props)
    }
}
