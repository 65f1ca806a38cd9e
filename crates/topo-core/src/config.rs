//! topology.toml and topogrid.toml configuration parsers.
//!
//! `TopologyConfig` describes what to build: switches, nodes, their
//! interfaces and their timed actions. `EngineConfig` describes where and
//! how to deploy it. Every `EngineConfig` section has working defaults so
//! an empty file is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{Engine, NodeRole, NodeType, OsFamily, RateUnit};

// ── Topology ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub experiment: ExperimentConfig,
    #[serde(default, rename = "switch")]
    pub switches: Vec<SwitchConfig>,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    /// Attach every VM node to a dedicated management network.
    pub control_network: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: Option<NodeType>,
    pub engine: Option<Engine>,
    pub os: Option<OsFamily>,
    pub role: Option<NodeRole>,
    pub vm: Option<VmConfig>,
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default, rename = "schedule")]
    pub schedule: Vec<ScheduleEntryConfig>,
    pub coschedule: Option<i32>,
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmConfig {
    pub architecture: Option<String>,
    pub image: Option<String>,
    pub memory: Option<u32>,
    pub vga: Option<String>,
    pub bios: Option<String>,
    pub power_state: Option<String>,
    pub cpu: Option<CpuConfig>,
    #[serde(default, rename = "drive")]
    pub drives: Vec<DriveConfig>,
    pub qemu_append: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuConfig {
    pub model: Option<String>,
    pub sockets: Option<u32>,
    pub cores: Option<u32>,
    pub threads: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    pub file: String,
    pub db_path: Option<String>,
    pub interface: Option<String>,
    pub cache: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub switch: String,
    pub address: Option<String>,
    /// Dotted quad (`255.255.255.0`) or prefix length (`24`).
    pub netmask: Option<String>,
    pub l2_only: Option<bool>,
    pub mac: Option<String>,
    pub driver: Option<String>,
    pub delay: Option<String>,
    pub rate: Option<u64>,
    pub unit: Option<RateUnit>,
    pub loss: Option<f64>,
}

/// One `[[node.schedule]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleEntryConfig {
    Run {
        start_time: f64,
        program: String,
        arguments: Option<Vec<String>>,
        resource: Option<bool>,
    },
    DropContent {
        start_time: f64,
        location: String,
        content: String,
        executable: Option<bool>,
        preload: Option<bool>,
    },
    DropFile {
        start_time: f64,
        location: String,
        filename: String,
        executable: Option<bool>,
        preload: Option<bool>,
    },
    Transfer {
        location: String,
        start_time: Option<f64>,
        interval: Option<f64>,
        destination: Option<String>,
        once: Option<bool>,
    },
    Pause {
        start_time: f64,
        duration: f64,
    },
    Break {
        start_time: f64,
    },
    VmResource {
        start_time: f64,
        name: String,
        dynamic: Option<String>,
        static_file: Option<String>,
    },
}

impl TopologyConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

// ── Engine ─────────────────────────────────────────────────────

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendSection,
    pub launch: LaunchSection,
    pub agent: AgentSection,
    pub translate: TranslateSection,
    pub state: StateSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Backend control binary invoked for every command.
    pub launcher: String,
    /// Backend working directory; also the root of per-instance sockets.
    pub base_dir: PathBuf,
    pub namespace: String,
    /// Host name of the cluster coordinator. Read from the kernel when unset.
    pub head_node: Option<String>,
    /// Arguments that make the launcher print running instances as JSON.
    pub inventory_args: Vec<String>,
    /// Directory name, relative to the image store, holding VM disks.
    pub image_store: String,
    /// Host bridge every VM interface is plugged into.
    pub bridge: String,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            launcher: "minimega".to_string(),
            base_dir: PathBuf::from("/tmp/minimega"),
            namespace: "topogrid".to_string(),
            head_node: None,
            inventory_args: vec![
                "-e".to_string(),
                ".json".to_string(),
                "true".to_string(),
                "vm".to_string(),
                "info".to_string(),
            ],
            image_store: "images".to_string(),
            bridge: "mega_bridge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSection {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    /// Where launch command files are written.
    pub output_dir: PathBuf,
    /// Refuse to deploy when the backend already runs instances.
    pub require_empty_testbed: bool,
    pub check_virtualization: bool,
}

impl Default for LaunchSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            output_dir: PathBuf::from("/tmp/topogrid"),
            require_empty_testbed: true,
            check_virtualization: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Optional interpreter placed before the agent binary.
    pub interpreter: Option<String>,
    pub binary: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            interpreter: None,
            binary: "/usr/local/bin/topogrid-agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateSection {
    /// Downgrade schedules on nodes without a guest channel to a warning.
    pub allow_unreachable_schedules: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSection {
    pub data_dir: PathBuf,
    /// Directories searched for files referenced by schedules.
    pub resource_dirs: Vec<PathBuf>,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/topogrid"),
            resource_dirs: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A complete `topogrid.toml` holding every default.
    pub fn scaffold() -> anyhow::Result<String> {
        Self::default().to_toml_string()
    }
}
