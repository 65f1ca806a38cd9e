//! Translator error types.

use thiserror::Error;

use topogrid_schedule::ScheduleError;

pub type TranslateResult<T> = Result<T, TranslateError>;

/// Errors raised while turning a node into a launch descriptor.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("node {node} must define an architecture")]
    MissingArchitecture { node: String },

    #[error("node {node} must define an image")]
    MissingImage { node: String },

    #[error("node {node} has no drives; the first drive is the boot image")]
    MissingBootDrive { node: String },

    #[error("interface {interface} on node {node} is missing required field {field}")]
    MissingInterfaceField {
        node: String,
        interface: String,
        field: &'static str,
    },

    #[error("drive {drive} on node {node} is missing required field {field}")]
    MissingDriveField {
        node: String,
        drive: usize,
        field: &'static str,
    },

    #[error("node {node} has a schedule but its engine offers no guest channel to deliver it")]
    UnreachableSchedule { node: String },

    #[error(
        "node {node} has an invalid vCPU topology: {sockets} sockets x {cores} cores x {threads} threads"
    )]
    InvalidVcpuTopology {
        node: String,
        sockets: u32,
        cores: u32,
        threads: u32,
    },

    #[error("tag {tag} on node {node} conflicts with a required endpoint property")]
    TagConflict { node: String, tag: String },

    #[error("schedule resolution failed for node {node}: {source}")]
    Resolution {
        node: String,
        #[source]
        source: ScheduleError,
    },
}
