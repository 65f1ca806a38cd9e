//! Error types for the schedule store.

use thiserror::Error;

use topogrid_schedule::ScheduleError;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("schedule for node {node} cannot be stored: {source}")]
    Schedule {
        node: String,
        #[source]
        source: ScheduleError,
    },

    #[error("missing resource files: {}", .0.join(", "))]
    MissingResources(Vec<String>),
}
