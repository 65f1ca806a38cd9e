//! Publishing a topology's schedules for the in-guest agents.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use topogrid_graph::Topology;

use crate::error::{StateError, StateResult};
use crate::store::ScheduleStore;
use crate::types::{ScheduleRecord, VmMapping};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub scheduled_nodes: Vec<String>,
    pub mappings: usize,
    /// Files referenced by the schedules that must exist before launch.
    pub required_resources: BTreeSet<String>,
}

/// Replace the store contents with this topology's schedules.
///
/// Every node gets a UUID mapping; nodes with a non-empty schedule also
/// get a record holding the encoded transport entries. Deferred content is
/// generated here, so a failing generator aborts the upload.
pub fn upload_schedules(
    store: &ScheduleStore,
    topology: &mut Topology,
) -> StateResult<UploadSummary> {
    store.clear()?;
    let mut summary = UploadSummary::default();

    for node in topology.nodes_mut() {
        let uuid = node.ensure_uuid();
        let name = node.name().to_string();
        store.put_mapping(&VmMapping {
            uuid,
            name: name.clone(),
            control_ip: node.control_ip,
            default_gateway: node.default_gateway,
        })?;
        summary.mappings += 1;

        if node.schedule.is_empty() {
            continue;
        }
        let schedule = node
            .schedule
            .encode()
            .map_err(|source| StateError::Schedule {
                node: name.clone(),
                source,
            })?;
        summary
            .required_resources
            .extend(node.schedule.required_resources());
        store.put_schedule(&ScheduleRecord {
            node: name.clone(),
            uuid,
            control_ip: node.control_ip,
            schedule,
        })?;
        summary.scheduled_nodes.push(name);
    }

    if summary.scheduled_nodes.is_empty() {
        warn!(topology = %topology.name, "no node has a schedule");
    } else {
        info!(
            topology = %topology.name,
            scheduled = summary.scheduled_nodes.len(),
            resources = summary.required_resources.len(),
            "schedules uploaded"
        );
    }
    Ok(summary)
}
