//! topogrid-graph — the topology model deployments are built from.
//!
//! Nodes carry validated capabilities, an ordered interface list, VM sizing
//! and their action schedule. Switches are plain named segments. Whole-graph
//! passes assign MAC addresses, insert the control network and derive
//! default gateways.
//!
//! # Architecture
//!
//! ```text
//! Topology
//!   ├── Switch (segment name)
//!   ├── Node
//!   │     ├── CapabilitySet (os family, role)
//!   │     ├── Interfaces (eth0.., control first)
//!   │     ├── VmSpec (architecture, cpu, drives, ...)
//!   │     └── NodeSchedule
//!   └── ControlNetwork (CTRLNET, 172.16.0.0/16)
//! ```

pub mod capability;
pub mod error;
pub mod interface;
pub mod mac;
pub mod node;
pub mod topology;

pub use capability::{Capability, CapabilitySet};
pub use error::{GraphError, GraphResult};
pub use interface::{Interface, Interfaces, Qos};
pub use mac::MacAllocator;
pub use node::{CpuSpec, DriveSpec, Node, VmSpec};
pub use topology::{CONTROL_NETWORK_NAME, ControlNetwork, Switch, Topology};
