//! End-to-end deployment of a parsed topology against the dry-run backend.

use std::time::Duration;

use topo_core::{EngineConfig, TopologyConfig};
use topogrid_graph::{MacAllocator, Topology};
use topogrid_launch::{DryRunBackend, LaunchConfig, LaunchPhase, Orchestrator};
use topogrid_translate::{TranslateConfig, Translator};

const TOPOLOGY: &str = r#"
[experiment]
name = "branch-office"
control_network = true

[[switch]]
name = "lan"

[[switch]]
name = "wan"

[[node]]
name = "gw"
type = "router"

[node.vm]
architecture = "x86_64"
image = "vyos"

[[node.vm.drive]]
file = "vyos.qcow2"

[[node.interface]]
switch = "lan"
address = "10.0.0.1"
netmask = "24"

[[node.interface]]
switch = "wan"
address = "192.168.1.2"
netmask = "255.255.255.0"
delay = "20ms"

[[node]]
name = "ws-1"
os = "unix"

[node.vm]
architecture = "x86_64"
image = "ubuntu"
memory = 1024

[[node.vm.drive]]
file = "ubuntu.qcow2"

[[node.interface]]
switch = "lan"
address = "10.0.0.10"
netmask = "24"

[[node.schedule]]
kind = "drop_content"
start_time = -1.0
location = "/etc/motd"
content = "welcome"

[[node.schedule]]
kind = "run"
start_time = 30.0
program = "/usr/bin/uptime"
"#;

fn engine_config(output_dir: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.backend.head_node = Some("head".to_string());
    config.launch.output_dir = output_dir.to_path_buf();
    config.launch.poll_interval_ms = 1;
    config.launch.max_attempts = 3;
    config.launch.check_virtualization = false;
    config
}

#[tokio::test]
async fn deploys_branch_office() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_config(dir.path());

    let config = TopologyConfig::from_toml_str(TOPOLOGY).unwrap();
    let mut topology = Topology::from_config(&config).unwrap();
    topology.assign_macs(&mut MacAllocator::default()).unwrap();
    assert_eq!(topology.assign_default_gateways(), 1);

    let backend = DryRunBackend::new("head", engine.backend.base_dir.clone());
    let translator = Translator::new(TranslateConfig::from_engine(&engine));
    let mut orch = Orchestrator::new(backend, translator, LaunchConfig::from_engine(&engine));

    let report = orch.deploy(&mut topology).await.unwrap();
    assert_eq!(orch.phase(), &LaunchPhase::Complete);

    // CTRLNET, lan and wan, control network first.
    assert_eq!(report.segments.len(), 3);
    assert_eq!(report.segments["CTRLNET"].0, 1);
    assert_eq!(report.endpoints.len(), 2);

    // Only the scheduled workstation gets an agent.
    assert_eq!(report.spawned.len(), 1);
    assert_eq!(report.spawned[0].node, "ws-1");
    assert_eq!(orch.backend().taps().await.len(), 1);

    let gw = orch
        .backend()
        .endpoints()
        .await
        .into_iter()
        .find(|e| e.name() == Some("gw"))
        .unwrap();
    // Control interface first, then the interfaces in declaration order.
    assert_eq!(gw.edges.len(), 3);
    assert_eq!(gw.edges[0].segment, report.segments["CTRLNET"]);
    assert_eq!(gw.edges[1].segment, report.segments["lan"]);
    assert_eq!(gw.edges[2].segment, report.segments["wan"]);
    assert_eq!(gw.edges[2].attributes["delay"], "20ms");

    let script = std::fs::read_to_string(&report.command_file).unwrap();
    assert!(script.contains("vm launch kvm gw"));
    assert!(script.contains("vm launch kvm ws-1"));
    assert!(script.contains("qos add gw 2 delay 20ms"));
    assert!(script.contains("vm config tags default_gateway 10.0.0.1"));
}

#[tokio::test]
async fn unconverged_launch_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_config(dir.path());
    engine.launch.poll_interval_ms = 0;

    let config = TopologyConfig::from_toml_str(TOPOLOGY).unwrap();
    let mut topology = Topology::from_config(&config).unwrap();
    topology.assign_macs(&mut MacAllocator::default()).unwrap();

    // A launch config with no attempts can never observe the instances.
    let mut launch = LaunchConfig::from_engine(&engine);
    launch.max_attempts = 0;
    launch.poll_interval = Duration::ZERO;
    let backend = DryRunBackend::new("head", "/tmp/minimega");
    let translator = Translator::new(TranslateConfig::from_engine(&engine));
    let mut orch = Orchestrator::new(backend, translator, launch);

    let err = orch.deploy(&mut topology).await.unwrap_err();
    assert!(err.to_string().contains("launch timed out"));
    assert!(matches!(orch.phase(), LaunchPhase::Failed { .. }));
}
