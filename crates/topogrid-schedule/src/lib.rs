//! topogrid-schedule — per-node timed action schedules.
//!
//! A node's schedule is an insertion-ordered list of entries, each with a
//! start time relative to the instantiation boundary. Entries are built
//! through validated constructors, may carry content generated lazily,
//! and are shipped to the in-guest agent in a uniform transport form.
//!
//! # Architecture
//!
//! ```text
//! NodeSchedule
//!   ├── ScheduleEntry (start_time, Payload, materialized)
//!   │     └── Content (Literal | Deferred | Failed)
//!   └── resolve() ──► to_transport() ──► encode() (bincode)
//!                         └── TransportEntry { executable, arguments, data, pause }
//! ```

pub mod content;
pub mod entry;
pub mod error;
pub mod schedule;
pub mod transport;

pub use content::{Content, GeneratorError};
pub use entry::{Attachment, EntryKind, Payload, ScheduleEntry};
pub use error::{ScheduleError, ScheduleResult};
pub use schedule::{NodeSchedule, TimelineSlot};
pub use transport::{Arguments, DataItem, PauseSpec, TransportEntry, decode, encode};
