//! Inline file content carried by schedule entries.
//!
//! Content is either known when the entry is built, or produced later by a
//! generator that runs exactly once when the owning schedule is resolved.

use std::fmt;

use crate::error::{ScheduleError, ScheduleResult};

/// Error type a content generator may return.
pub type GeneratorError = Box<dyn std::error::Error + Send + Sync>;

type Generator = Box<dyn FnOnce() -> Result<String, GeneratorError> + Send>;

/// Content for a file written into a guest.
pub enum Content {
    /// Content known up front.
    Literal(String),
    /// Content produced on resolution.
    Deferred(Generator),
    /// The generator ran and failed; holds the failure message.
    Failed(String),
}

impl Content {
    pub fn literal(text: impl Into<String>) -> Self {
        Content::Literal(text.into())
    }

    /// Wrap a generator that is invoked once, at schedule resolution.
    pub fn deferred<F>(generate: F) -> Self
    where
        F: FnOnce() -> Result<String, GeneratorError> + Send + 'static,
    {
        Content::Deferred(Box::new(generate))
    }

    /// True once the content is a concrete string.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Content::Literal(_))
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Content::Literal(text) => Some(text),
            _ => None,
        }
    }

    /// Run the generator if one is pending.
    ///
    /// Returns `true` when a generator was invoked by this call. A failed
    /// generator is never retried; later calls report the same error.
    pub(crate) fn resolve(&mut self, location: &str) -> ScheduleResult<bool> {
        let pending = std::mem::replace(self, Content::Failed("generator did not complete".into()));
        match pending {
            Content::Literal(text) => {
                *self = Content::Literal(text);
                Ok(false)
            }
            Content::Failed(reason) => {
                *self = Content::Failed(reason.clone());
                Err(ScheduleError::ContentGeneration {
                    location: location.to_string(),
                    reason,
                })
            }
            Content::Deferred(generate) => match generate() {
                Ok(text) => {
                    *self = Content::Literal(text);
                    Ok(true)
                }
                Err(e) => {
                    let reason = e.to_string();
                    *self = Content::Failed(reason.clone());
                    Err(ScheduleError::ContentGeneration {
                        location: location.to_string(),
                        reason,
                    })
                }
            },
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Content::Deferred(_) => f.write_str("Deferred(..)"),
            Content::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Literal(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Literal(text.to_string())
    }
}
