//! topogrid-state — where scheduled nodes' agents find their work.
//!
//! Backed by [redb](https://docs.rs/redb). Before a topology is launched its
//! schedules are encoded into transport form and stored per node, together
//! with a UUID to node mapping the agents use to identify themselves.
//!
//! # Architecture
//!
//! ```text
//! upload_schedules(&ScheduleStore, &mut Topology)
//!   ├── SCHEDULES   node name ──► ScheduleRecord (JSON, bincode schedule)
//!   └── VM_MAPPINGS uuid      ──► VmMapping
//! validate_resources(required, dirs) ──► walkdir search
//! ```
//!
//! The `ScheduleStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod resources;
pub mod store;
pub mod tables;
pub mod types;
pub mod upload;

pub use error::{StateError, StateResult};
pub use resources::{find_resources, validate_resources};
pub use store::ScheduleStore;
pub use types::{ScheduleRecord, VmMapping};
pub use upload::{UploadSummary, upload_schedules};
