use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use topogrid_schedule::{ScheduleResult, TransportEntry, decode};

/// A node's schedule in transport form, as fetched by its agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub node: String,
    pub uuid: Uuid,
    pub control_ip: Option<Ipv4Addr>,
    /// bincode-encoded `Vec<TransportEntry>`.
    pub schedule: Vec<u8>,
}

impl ScheduleRecord {
    pub fn table_key(&self) -> &str {
        &self.node
    }

    pub fn entries(&self) -> ScheduleResult<Vec<TransportEntry>> {
        decode(&self.schedule)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmMapping {
    pub uuid: Uuid,
    pub name: String,
    pub control_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub default_gateway: Option<Ipv4Addr>,
}

impl VmMapping {
    pub fn table_key(&self) -> String {
        self.uuid.to_string()
    }
}
