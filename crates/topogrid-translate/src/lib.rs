//! topogrid-translate — node to launch descriptor translation.
//!
//! Each topology node becomes one [`LaunchDescriptor`]: VM sizing with
//! defaults applied, the drive list (boot image first), NICs with MACs and
//! QoS, the QMP socket and, for scheduled nodes, the guest channel and the
//! agent process that delivers the schedule.
//!
//! # Architecture
//!
//! ```text
//! Translator (TranslateConfig: base_dir, namespace, image store, agent)
//!   └── translate(&mut Node)
//!         ├── apply_defaults ──► written back onto the node
//!         ├── schedule.resolve()
//!         └── LaunchDescriptor ──► endpoint_properties()
//! ```

pub mod descriptor;
pub mod error;
pub mod translator;

pub use descriptor::{
    AgentDescriptor, ChannelDescriptor, DriveConfig, LaunchDescriptor, NicConfig, VcpuConfig,
};
pub use error::{TranslateError, TranslateResult};
pub use translator::{TranslateConfig, Translator};
