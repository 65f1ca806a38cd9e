//! Topology nodes and their VM sizing.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use uuid::Uuid;

use topo_core::{Engine, NodeType, OsFamily};
use topogrid_schedule::entry::{
    DEFAULT_TRANSFER_INTERVAL, DEFAULT_TRANSFER_ONCE_START, DEFAULT_TRANSFER_START,
};
use topogrid_schedule::{Arguments, Content, NodeSchedule, ScheduleEntry, ScheduleResult};

use crate::capability::{Capability, CapabilitySet};
use crate::error::{GraphError, GraphResult};
use crate::interface::Interfaces;

/// Characters a node name may not contain.
const FORBIDDEN_NAME_CHARS: [char; 3] = ['_', ' ', ','];

#[derive(Debug, Clone, PartialEq)]
pub struct DriveSpec {
    pub file: String,
    pub db_path: Option<String>,
    pub interface: Option<String>,
    pub cache: Option<String>,
}

impl DriveSpec {
    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            db_path: None,
            interface: None,
            cache: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuSpec {
    pub model: Option<String>,
    pub sockets: Option<u32>,
    pub cores: Option<u32>,
    pub threads: Option<u32>,
}

/// VM sizing and boot configuration. Unset fields are defaulted at translation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmSpec {
    pub architecture: Option<String>,
    pub image: Option<String>,
    /// Memory in MiB.
    pub memory: Option<u32>,
    pub vga: Option<String>,
    pub bios: Option<String>,
    pub power_state: Option<String>,
    pub cpu: CpuSpec,
    /// First drive is the boot image.
    pub drives: Vec<DriveSpec>,
    pub qemu_append: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct Node {
    name: String,
    pub node_type: NodeType,
    pub engine: Engine,
    pub capabilities: CapabilitySet,
    pub vm: VmSpec,
    pub interfaces: Interfaces,
    pub schedule: NodeSchedule,
    /// Assigned at first translation and stable afterwards.
    pub uuid: Option<Uuid>,
    pub control_ip: Option<Ipv4Addr>,
    pub default_gateway: Option<Ipv4Addr>,
    pub coschedule: Option<i32>,
    pub tags: BTreeMap<String, String>,
}

impl Node {
    pub fn new(name: &str, node_type: NodeType) -> GraphResult<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            node_type,
            engine: Engine::default(),
            capabilities: CapabilitySet::new(),
            vm: VmSpec::default(),
            interfaces: Interfaces::default(),
            schedule: NodeSchedule::new(),
            uuid: None,
            control_ip: None,
            default_gateway: None,
            coschedule: None,
            tags: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_capability(&mut self, capability: Capability) -> GraphResult<()> {
        self.capabilities.add(capability)
    }

    pub fn os_family(&self) -> OsFamily {
        self.capabilities.os_family()
    }

    /// Return the node's UUID, assigning a fresh one on first use.
    pub fn ensure_uuid(&mut self) -> Uuid {
        *self.uuid.get_or_insert_with(Uuid::new_v4)
    }

    // ── Schedule helpers ───────────────────────────────────────

    pub fn run_executable(
        &mut self,
        start_time: f64,
        program: &str,
        arguments: Option<Arguments>,
        is_resource: bool,
    ) -> GraphResult<()> {
        let entry = self.checked(ScheduleEntry::run_executable(
            start_time,
            program,
            arguments,
            is_resource,
        ))?;
        self.schedule.add(entry);
        Ok(())
    }

    /// Write `content` to `location`; with `preload` it is staged and moved.
    pub fn drop_content(
        &mut self,
        start_time: f64,
        location: &str,
        content: Content,
        executable: bool,
        preload: bool,
    ) -> GraphResult<()> {
        if preload {
            let os = self.os_family();
            let entries = self.checked(ScheduleEntry::preloaded_content(
                start_time, location, content, executable, os,
            ))?;
            self.schedule.extend(entries);
        } else {
            let entry = self.checked(ScheduleEntry::drop_content(
                start_time, location, content, executable,
            ))?;
            self.schedule.add(entry);
        }
        Ok(())
    }

    /// Copy the resource `filename` to `location`; with `preload` it is staged and moved.
    pub fn drop_file(
        &mut self,
        start_time: f64,
        location: &str,
        filename: &str,
        executable: bool,
        preload: bool,
    ) -> GraphResult<()> {
        if preload {
            let os = self.os_family();
            let entries = self.checked(ScheduleEntry::preloaded_file(
                start_time, location, filename, executable, os,
            ))?;
            self.schedule.extend(entries);
        } else {
            let entry = self.checked(ScheduleEntry::drop_file(
                start_time, location, filename, executable,
            ))?;
            self.schedule.add(entry);
        }
        Ok(())
    }

    /// Repeatedly pull `location` out of the guest.
    pub fn file_transfer(
        &mut self,
        location: &str,
        interval: Option<f64>,
        start_time: Option<f64>,
        destination: Option<&str>,
    ) -> GraphResult<()> {
        let only_if_changed = self.os_family().skips_unchanged_transfers();
        let entry = self.checked(ScheduleEntry::file_transfer(
            location,
            Some(interval.unwrap_or(DEFAULT_TRANSFER_INTERVAL)),
            start_time.unwrap_or(DEFAULT_TRANSFER_START),
            destination,
            only_if_changed,
        ))?;
        self.schedule.add(entry);
        Ok(())
    }

    /// Pull `location` out of the guest a single time.
    pub fn file_transfer_once(
        &mut self,
        location: &str,
        start_time: Option<f64>,
        destination: Option<&str>,
    ) -> GraphResult<()> {
        let only_if_changed = self.os_family().skips_unchanged_transfers();
        let entry = self.checked(ScheduleEntry::file_transfer(
            location,
            None,
            start_time.unwrap_or(DEFAULT_TRANSFER_ONCE_START),
            destination,
            only_if_changed,
        ))?;
        self.schedule.add(entry);
        Ok(())
    }

    pub fn set_pause(&mut self, start_time: f64, duration: f64) -> GraphResult<()> {
        let entry = self.checked(ScheduleEntry::pause(start_time, duration))?;
        self.schedule.add(entry);
        Ok(())
    }

    pub fn set_break(&mut self, start_time: f64) -> GraphResult<()> {
        let entry = self.checked(ScheduleEntry::breakpoint(start_time))?;
        self.schedule.add(entry);
        Ok(())
    }

    pub fn add_vm_resource(
        &mut self,
        start_time: f64,
        name: &str,
        dynamic: Option<Content>,
        static_file: Option<&str>,
    ) -> GraphResult<()> {
        let entry = self.checked(ScheduleEntry::vm_resource(
            start_time,
            name,
            dynamic,
            static_file,
        ))?;
        self.schedule.add(entry);
        Ok(())
    }

    fn checked<T>(&self, result: ScheduleResult<T>) -> GraphResult<T> {
        result.map_err(|source| GraphError::Schedule {
            node: self.name.clone(),
            source,
        })
    }
}

pub fn validate_name(name: &str) -> GraphResult<()> {
    if name.is_empty() || name.contains(FORBIDDEN_NAME_CHARS) {
        return Err(GraphError::InvalidNodeName(name.to_string()));
    }
    Ok(())
}
