//! Transport form of schedule entries.
//!
//! This is the uniform record the in-guest agent consumes. Every entry kind
//! normalizes to the same shape; the agent orders entries by `start_time`
//! itself. Encoding uses bincode so `±inf` start times survive unchanged.

use serde::{Deserialize, Serialize};

use crate::error::{ScheduleError, ScheduleResult};

/// Arguments passed to an executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arguments {
    /// Positional arguments.
    List(Vec<String>),
    /// A single command line handed to the guest shell as-is.
    Line(String),
}

impl From<Vec<String>> for Arguments {
    fn from(args: Vec<String>) -> Self {
        Arguments::List(args)
    }
}

impl From<&str> for Arguments {
    fn from(line: &str) -> Self {
        Arguments::Line(line.to_string())
    }
}

/// One file-level item staged by an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataItem {
    /// Write inline content to `location`.
    Content {
        location: String,
        content: String,
        executable: bool,
    },
    /// Copy the named resource file to `location`.
    File {
        location: String,
        filename: String,
        executable: bool,
    },
    /// Pull `location` out of the guest, once or every `interval` seconds.
    Transfer {
        location: String,
        interval: Option<f64>,
        destination: Option<String>,
        only_if_changed: bool,
    },
}

impl DataItem {
    pub fn location(&self) -> &str {
        match self {
            DataItem::Content { location, .. }
            | DataItem::File { location, .. }
            | DataItem::Transfer { location, .. } => location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PauseSpec {
    pub duration: f64,
}

/// A schedule entry as shipped to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportEntry {
    pub start_time: f64,
    pub executable: Option<String>,
    pub arguments: Option<Arguments>,
    pub data: Vec<DataItem>,
    pub pause: Option<PauseSpec>,
}

/// Encode an ordered entry list.
pub fn encode(entries: &[TransportEntry]) -> ScheduleResult<Vec<u8>> {
    bincode::serialize(entries).map_err(|e| ScheduleError::Encode(e.to_string()))
}

/// Decode bytes produced by [`encode`].
pub fn decode(bytes: &[u8]) -> ScheduleResult<Vec<TransportEntry>> {
    bincode::deserialize(bytes).map_err(|e| ScheduleError::Decode(e.to_string()))
}
