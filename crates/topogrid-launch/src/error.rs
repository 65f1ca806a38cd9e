use thiserror::Error;

use topogrid_translate::TranslateError;

use crate::backend::SegmentId;

pub type BackendResult<T> = Result<T, BackendError>;
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Failures reported by a deployment backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(u64),

    #[error("unknown segment: {0}")]
    UnknownSegment(u64),

    #[error("invalid backend response: {0}")]
    Response(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("KVM virtualization not enabled on this host: {0}")]
    VirtualizationUnavailable(String),

    #[error("testbed busy: {running} instance(s) already running")]
    TestbedBusy { running: usize },

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("node {node}: no segment registered for switch {segment}")]
    UnknownSegment { node: String, segment: String },

    #[error("node {node}: interface {position} bound to {found:?}, expected {expected}")]
    BindingMismatch {
        node: String,
        position: usize,
        expected: SegmentId,
        found: Option<SegmentId>,
    },

    #[error("launch timed out: {observed}/{expected} instance(s) running after {attempts} attempt(s)")]
    LaunchTimeout {
        expected: usize,
        observed: usize,
        attempts: u32,
    },

    #[error("node {node} is not in the running inventory")]
    MissingInstance { node: String },

    #[error("agent argument encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
