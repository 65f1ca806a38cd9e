//! `topogridd plan` — a full deployment against the dry-run backend.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use topogrid_launch::{DryRunBackend, LaunchConfig, LaunchReport, Orchestrator};
use topogrid_translate::{TranslateConfig, Translator};

use crate::load::{Loaded, load};

/// Head node reported by the dry-run backend when none is configured.
const PLAN_HEAD_NODE: &str = "localhost";

pub async fn run(
    topology: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let report = plan(topology, config).await?;
    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(?path, "plan written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Host checks are skipped and convergence is immediate; everything else
/// runs exactly as a real launch would.
pub async fn plan(topology: &Path, config: Option<&Path>) -> anyhow::Result<LaunchReport> {
    let Loaded {
        mut topology,
        engine,
    } = load(topology, config)?;

    let mut launch = LaunchConfig::from_engine(&engine);
    launch.check_virtualization = false;
    launch.require_empty_testbed = false;
    launch.poll_interval = Duration::ZERO;

    let head_node = engine.backend.head_node.as_deref().unwrap_or(PLAN_HEAD_NODE);
    let backend = DryRunBackend::new(head_node, engine.backend.base_dir.clone());
    let translator = Translator::new(TranslateConfig::from_engine(&engine));
    let mut orchestrator = Orchestrator::new(backend, translator, launch);

    let report = orchestrator.deploy(&mut topology).await?;
    info!(
        nodes = report.endpoints.len(),
        segments = report.segments.len(),
        commands = ?report.command_file,
        "plan complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPOLOGY: &str = r#"
[experiment]
name = "plan-test"

[[switch]]
name = "lan"

[[node]]
name = "a"

[node.vm]
architecture = "x86_64"
image = "ubuntu"

[[node.vm.drive]]
file = "ubuntu.qcow2"

[[node.interface]]
switch = "lan"
address = "10.0.0.1"
netmask = "24"

[[node.schedule]]
kind = "break"
start_time = 0.0
"#;

    #[tokio::test]
    async fn plan_writes_commands_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let topology = dir.path().join("topology.toml");
        std::fs::write(&topology, TOPOLOGY).unwrap();
        let config = dir.path().join("topogrid.toml");
        let out = dir.path().join("out");
        std::fs::write(
            &config,
            format!("[launch]\noutput_dir = {:?}\n", out.display().to_string()),
        )
        .unwrap();

        let report = plan(&topology, Some(&config)).await.unwrap();

        assert_eq!(report.endpoints.len(), 1);
        assert_eq!(report.spawned.len(), 1);
        assert!(out.join(topogrid_launch::COMMAND_FILE).exists());
    }
}
