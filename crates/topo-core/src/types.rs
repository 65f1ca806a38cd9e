//! Shared types used across topogrid crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a textual enum value is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseTypeError {
    pub kind: &'static str,
    pub value: String,
}

/// Guest operating system family. Families are mutually exclusive on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Unix,
    Windows,
}

impl OsFamily {
    /// Shell command that moves a file inside the guest.
    pub fn move_command(&self) -> &'static str {
        match self {
            OsFamily::Unix => "mv",
            OsFamily::Windows => "move",
        }
    }

    /// Whether periodic transfers skip files that have not changed.
    pub fn skips_unchanged_transfers(&self) -> bool {
        matches!(self, OsFamily::Unix)
    }
}

/// Guest role. Roles are mutually exclusive on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Server,
    Desktop,
}

/// Kind of topology vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Host,
    Router,
    Switch,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Host => "host",
            NodeType::Router => "router",
            NodeType::Switch => "switch",
        };
        f.write_str(s)
    }
}

/// Virtualization engine that runs a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Qemu,
    Container,
}

impl Engine {
    /// Name the backend and the agent use for this engine.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Engine::Qemu => "QemuVM",
            Engine::Container => "Container",
        }
    }

    /// Instance kind passed to `vm launch`.
    pub fn launch_kind(&self) -> &'static str {
        match self {
            Engine::Qemu => "kvm",
            Engine::Container => "container",
        }
    }

    /// Whether the engine exposes a virtio serial channel to the guest.
    pub fn has_serial_channel(&self) -> bool {
        matches!(self, Engine::Qemu)
    }
}

/// Link rate unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    Kbit,
    #[default]
    Mbit,
    Gbit,
}

impl fmt::Display for RateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateUnit::Kbit => "kbit",
            RateUnit::Mbit => "mbit",
            RateUnit::Gbit => "gbit",
        };
        f.write_str(s)
    }
}

impl FromStr for RateUnit {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kbit" => Ok(RateUnit::Kbit),
            "mbit" => Ok(RateUnit::Mbit),
            "gbit" => Ok(RateUnit::Gbit),
            other => Err(ParseTypeError {
                kind: "rate unit",
                value: other.to_string(),
            }),
        }
    }
}
