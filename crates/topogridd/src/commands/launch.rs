//! `topogridd launch` — upload schedules, then deploy for real.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use topo_core::EngineConfig;
use topogrid_launch::{LaunchConfig, Orchestrator, ProcessBackend};
use topogrid_state::{ScheduleStore, upload_schedules, validate_resources};
use topogrid_translate::{TranslateConfig, Translator};

use crate::load::{Loaded, load};

/// File name of the schedule store inside the data directory.
pub const STORE_FILE: &str = "schedules.redb";

pub async fn run(topology_path: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let Loaded {
        mut topology,
        engine,
    } = load(topology_path, config)?;

    let data_dir = &engine.state.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let store = ScheduleStore::open(&data_dir.join(STORE_FILE))?;
    let summary = upload_schedules(&store, &mut topology)?;

    let dirs = resource_dirs(&engine, topology_path);
    let resources = validate_resources(&summary.required_resources, &dirs)?;
    info!(resources = resources.len(), "schedule resources located");

    let backend = ProcessBackend::from_config(&engine.backend)?;
    let translator = Translator::new(TranslateConfig::from_engine(&engine));
    let mut orchestrator = Orchestrator::new(backend, translator, LaunchConfig::from_engine(&engine));
    let report = orchestrator.deploy(&mut topology).await?;

    for failure in &report.spawn_failures {
        warn!(node = %failure.node, reason = %failure.reason, "node launched without agent");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Configured resource directories, or the topology file's directory.
fn resource_dirs(engine: &EngineConfig, topology_path: &Path) -> Vec<PathBuf> {
    if !engine.state.resource_dirs.is_empty() {
        return engine.state.resource_dirs.clone();
    }
    let parent = topology_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    vec![parent.to_path_buf()]
}
