//! Shared loading of topology and engine config files.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use topo_core::{EngineConfig, TopologyConfig};
use topogrid_graph::{MacAllocator, Topology};

pub struct Loaded {
    pub topology: Topology,
    pub engine: EngineConfig,
}

/// Parse both files, then assign MACs and default gateways.
pub fn load(topology_path: &Path, config_path: Option<&Path>) -> anyhow::Result<Loaded> {
    let engine = match config_path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("reading engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let config = TopologyConfig::from_file(topology_path)
        .with_context(|| format!("reading topology {}", topology_path.display()))?;

    let mut topology = Topology::from_config(&config)?;
    let macs = topology.assign_macs(&mut MacAllocator::default())?;
    let gateways = topology.assign_default_gateways();
    info!(
        topology = %topology.name,
        nodes = topology.nodes().len(),
        macs,
        gateways,
        "topology prepared"
    );
    Ok(Loaded { topology, engine })
}
