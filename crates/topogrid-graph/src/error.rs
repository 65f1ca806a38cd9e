//! Topology model error types.

use thiserror::Error;

use topogrid_schedule::ScheduleError;

/// Result type alias for topology operations.
pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid node name {0:?}: names may not contain '_', ' ' or ','")]
    InvalidNodeName(String),

    #[error("capability conflict: {requested} cannot be combined with {existing}")]
    CapabilityConflict { existing: String, requested: String },

    #[error("duplicate node: {0}")]
    DuplicateNode(String),

    #[error("duplicate switch: {0}")]
    DuplicateSwitch(String),

    #[error("node not found: {0}")]
    UnknownNode(String),

    #[error("switch not found: {0}")]
    UnknownSwitch(String),

    #[error("invalid address {value:?}: {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("invalid netmask {0:?}")]
    InvalidNetmask(String),

    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),

    #[error("MAC address space exhausted")]
    MacSpaceExhausted,

    #[error("control network address space exhausted")]
    ControlNetworkExhausted,

    #[error("schedule error on {node}: {source}")]
    Schedule {
        node: String,
        #[source]
        source: ScheduleError,
    },
}
