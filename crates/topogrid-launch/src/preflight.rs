//! Host checks that run before anything is registered with the backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::error::{LaunchError, LaunchResult};

/// Nested-virtualization module parameters, checked in order.
pub const KVM_NESTED_PARAMS: [&str; 2] = [
    "/sys/module/kvm_intel/parameters/nested",
    "/sys/module/kvm_amd/parameters/nested",
];

/// Checks from the host validation tool that must all pass, matched on
/// the message part of each line.
pub const REQUIRED_HOST_CHECKS: [&str; 4] = [
    "Checking for hardware virtualization",
    "Checking if device /dev/kvm exists",
    "Checking if device /dev/vhost-net exists",
    "Checking if device /dev/net/tun exists",
];

const HOST_VALIDATE_TOOL: &str = "virt-host-validate";

#[async_trait]
pub trait VirtualizationProbe: Send + Sync {
    /// Contents of a kernel parameter file, or `None` when it is absent.
    async fn read_param(&self, path: &str) -> Option<String>;

    /// Output of the host validation tool, or `None` when it cannot run.
    async fn host_validate(&self) -> Option<String>;
}

/// Probe backed by the real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

#[async_trait]
impl VirtualizationProbe for HostProbe {
    async fn read_param(&self, path: &str) -> Option<String> {
        tokio::fs::read_to_string(path).await.ok()
    }

    async fn host_validate(&self) -> Option<String> {
        match Command::new(HOST_VALIDATE_TOOL).output().await {
            // A non-zero exit still carries the per-check results.
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Some(text)
            }
            Err(e) => {
                warn!(tool = HOST_VALIDATE_TOOL, error = %e, "host validation unavailable");
                None
            }
        }
    }
}

/// Fail unless the host can run KVM guests.
///
/// The first nested-virtualization parameter that exists decides: `Y`
/// passes, anything else fails. On hosts without either file the
/// validation tool output is consulted; if the tool cannot run the check
/// fails.
pub async fn check_virtualization(probe: &dyn VirtualizationProbe) -> LaunchResult<()> {
    for path in KVM_NESTED_PARAMS {
        if let Some(value) = probe.read_param(path).await {
            let value = value.trim();
            debug!(%path, %value, "nested virtualization parameter");
            return if value == "Y" {
                Ok(())
            } else {
                Err(LaunchError::VirtualizationUnavailable(format!(
                    "{path} is {value:?}"
                )))
            };
        }
    }

    let Some(output) = probe.host_validate().await else {
        return Err(LaunchError::VirtualizationUnavailable(format!(
            "{HOST_VALIDATE_TOOL} could not be run"
        )));
    };
    let missing = failed_host_checks(&output);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(LaunchError::VirtualizationUnavailable(format!(
            "failed host checks: {}",
            missing.join("; ")
        )))
    }
}

/// Required checks that do not report `PASS`.
///
/// Each tool line has the form `<driver>: <check> : <result>`; lines that
/// do not split into exactly those three parts are ignored. The driver is
/// not compared, and the last line for a check wins.
pub fn failed_host_checks(output: &str) -> Vec<&'static str> {
    let mut results: BTreeMap<&str, bool> = BTreeMap::new();
    for line in output.lines() {
        let parts: Vec<&str> = line.split(':').map(str::trim).collect();
        if let [_driver, check, result] = parts.as_slice() {
            results.insert(*check, *result == "PASS");
        }
    }
    REQUIRED_HOST_CHECKS
        .into_iter()
        .filter(|check| results.get(check) != Some(&true))
        .collect()
}

/// Fail when the backend already runs instances.
pub async fn ensure_testbed_available<B: Backend + ?Sized>(backend: &B) -> LaunchResult<()> {
    let running = backend.list_running_instances().await?;
    if running.is_empty() {
        Ok(())
    } else {
        Err(LaunchError::TestbedBusy {
            running: running.len(),
        })
    }
}
