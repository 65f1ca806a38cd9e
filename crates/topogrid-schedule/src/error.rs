//! Schedule error types.

use thiserror::Error;

/// Result type alias for schedule operations.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Errors raised while building, resolving or encoding a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid start time: {0}")]
    InvalidStartTime(f64),

    #[error("invalid pause duration {0}: must be non-negative")]
    InvalidPauseDuration(f64),

    #[error("invalid transfer interval {0}: must be positive")]
    InvalidTransferInterval(f64),

    #[error("content generation failed for {location}: {reason}")]
    ContentGeneration { location: String, reason: String },

    #[error("content for {location} has not been resolved")]
    Unresolved { location: String },

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("decoding error: {0}")]
    Decode(String),
}
