pub mod config;
pub mod types;

pub use config::{EngineConfig, TopologyConfig};
pub use types::*;
