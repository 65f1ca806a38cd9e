//! Backend that drives the launcher binary as a child process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use topo_core::config::BackendSection;

use crate::backend::{Backend, Endpoint, EndpointId, RunningInstance, SegmentId};
use crate::error::{BackendError, BackendResult};
use crate::registry::Registry;

const HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";

#[derive(Debug)]
pub struct ProcessBackend {
    launcher: String,
    base_dir: PathBuf,
    inventory_args: Vec<String>,
    head_node: String,
    registry: Mutex<Registry>,
}

impl ProcessBackend {
    /// Build from the `[backend]` config section. Without a configured head
    /// node the local kernel host name is used.
    pub fn from_config(config: &BackendSection) -> BackendResult<Self> {
        let head_node = match &config.head_node {
            Some(name) => name.clone(),
            None => std::fs::read_to_string(HOSTNAME_PATH)?.trim().to_string(),
        };
        Ok(Self {
            launcher: config.launcher.clone(),
            base_dir: config.base_dir.clone(),
            inventory_args: config.inventory_args.clone(),
            head_node,
            registry: Mutex::new(Registry::new()),
        })
    }

    async fn run<I, S>(&self, args: I) -> BackendResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(&self.launcher);
        command.arg(format!("-base={}", self.base_dir.display()));
        command.args(args);
        let rendered = format!("{command:?}");
        debug!(command = %rendered, "running launcher");

        let output = command.output().await.map_err(|e| BackendError::Command {
            command: rendered.clone(),
            reason: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(BackendError::Command {
                command: rendered,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    async fn insert_network(&self) -> BackendResult<SegmentId> {
        Ok(self.registry.lock().await.insert_network())
    }

    async fn insert_endpoint(
        &self,
        properties: BTreeMap<String, String>,
    ) -> BackendResult<Endpoint> {
        Ok(self.registry.lock().await.insert_endpoint(properties))
    }

    async fn connect_endpoint(
        &self,
        endpoint: EndpointId,
        segment: SegmentId,
    ) -> BackendResult<Endpoint> {
        self.registry.lock().await.connect_endpoint(endpoint, segment)
    }

    async fn update_endpoint(&self, endpoint: Endpoint) -> BackendResult<Endpoint> {
        self.registry.lock().await.update_endpoint(endpoint)
    }

    async fn emit_commands(&self, path: &Path) -> BackendResult<()> {
        let script = self.registry.lock().await.render_commands();
        tokio::fs::write(path, script).await?;
        info!(?path, "launch command file written");
        Ok(())
    }

    async fn launch(&self, path: &Path) -> BackendResult<()> {
        let path = path.display().to_string();
        self.run(["-e", "read", path.as_str()]).await?;
        Ok(())
    }

    async fn list_running_instances(&self) -> BackendResult<BTreeMap<String, RunningInstance>> {
        let output = self.run(&self.inventory_args).await?;
        parse_inventory(&output, &self.head_node)
    }

    async fn create_tap(&self, segment: SegmentId, host_cidr: &str) -> BackendResult<()> {
        let network = segment.network_name();
        self.run(["-e", "tap", "create", network.as_str(), "ip", host_cidr])
            .await?;
        info!(%network, %host_cidr, "host tap created");
        Ok(())
    }

    async fn spawn_process(&self, command: &str) -> BackendResult<()> {
        self.run(["-e", command]).await?;
        Ok(())
    }

    fn head_node(&self) -> &str {
        &self.head_node
    }

    fn instance_root(&self) -> &Path {
        &self.base_dir
    }
}

/// Parse the launcher's JSON inventory.
///
/// Two shapes are accepted: a flat array of `{name, id, host}` objects, and
/// the launcher's per-host response array where each element carries a
/// `Host` and a `Data` list of `{Name, ID}` objects. A missing host falls
/// back to `default_host`.
pub fn parse_inventory(
    output: &str,
    default_host: &str,
) -> BackendResult<BTreeMap<String, RunningInstance>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| BackendError::Response(e.to_string()))?;
    let items = value
        .as_array()
        .ok_or_else(|| BackendError::Response("inventory is not a JSON array".to_string()))?;

    let mut instances = BTreeMap::new();
    for item in items {
        if let Some(data) = item.get("Data").and_then(Value::as_array) {
            let host = field(item, &["Host", "host"]).unwrap_or_else(|| default_host.to_string());
            for vm in data {
                let instance = instance_from(vm, &host)?;
                instances.insert(instance.name.clone(), instance);
            }
        } else {
            let instance = instance_from(item, default_host)?;
            instances.insert(instance.name.clone(), instance);
        }
    }
    Ok(instances)
}

fn instance_from(value: &Value, default_host: &str) -> BackendResult<RunningInstance> {
    let name = field(value, &["name", "Name"])
        .ok_or_else(|| BackendError::Response(format!("inventory entry without name: {value}")))?;
    let id = field(value, &["id", "ID", "Id"])
        .ok_or_else(|| BackendError::Response(format!("inventory entry without id: {value}")))?;
    let host = field(value, &["host", "Host"]).unwrap_or_else(|| default_host.to_string());
    Ok(RunningInstance { name, id, host })
}

/// First present key among `keys`, with numbers rendered as strings.
fn field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
