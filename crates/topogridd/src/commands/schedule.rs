//! `topogridd schedule` — per-node timelines as JSON.

use std::path::Path;

use serde::Serialize;

use topogrid_graph::Topology;
use topogrid_schedule::TimelineSlot;

use crate::load::load;

#[derive(Debug, Serialize)]
pub struct NodeTimeline {
    pub node: String,
    pub slots: Vec<TimelineSlot>,
}

pub fn run(topology: &Path, node: Option<&str>) -> anyhow::Result<()> {
    let mut loaded = load(topology, None)?;
    let timelines = timelines(&mut loaded.topology, node)?;
    println!("{}", serde_json::to_string_pretty(&timelines)?);
    Ok(())
}

/// Timelines of scheduled nodes, or of `only` when given.
pub fn timelines(topology: &mut Topology, only: Option<&str>) -> anyhow::Result<Vec<NodeTimeline>> {
    if let Some(name) = only {
        if topology.node(name).is_none() {
            anyhow::bail!("unknown node {name}");
        }
    }
    let mut out = Vec::new();
    for node in topology.nodes_mut() {
        let selected = match only {
            Some(name) => node.name() == name,
            None => !node.schedule.is_empty(),
        };
        if !selected {
            continue;
        }
        let name = node.name().to_string();
        let slots = node
            .schedule
            .timeline()
            .map_err(|e| anyhow::anyhow!("node {name}: {e}"))?;
        out.push(NodeTimeline { node: name, slots });
    }
    Ok(out)
}
