//! topogrid-launch — deploys a topology onto a backend.
//!
//! The orchestrator checks the host, translates every node, registers one
//! segment per switch and one endpoint per node, writes and runs the launch
//! command file, waits until the backend reports every instance running and
//! finally starts a schedule agent for each scheduled node.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator<B: Backend>
//!   ├── preflight ──► VirtualizationProbe, empty testbed
//!   ├── Translator::translate_all
//!   ├── Registry (segments, endpoints, edges)
//!   │     ├── ProcessBackend ──► launcher child processes
//!   │     └── DryRunBackend  ──► records only
//!   ├── ConvergencePoller ──► Sleeper + list_running_instances
//!   └── SpawnInstruction ──► spawn_process (local or via mesh)
//! ```

pub mod backend;
pub mod convergence;
pub mod dry_run;
pub mod error;
pub mod orchestrator;
pub mod preflight;
pub mod process;
pub mod registry;
pub mod spawn;

#[cfg(test)]
mod testing;

pub use backend::{Backend, Edge, Endpoint, EndpointId, RunningInstance, SegmentId};
pub use convergence::{ConvergencePoller, Sleeper, TokioSleeper};
pub use dry_run::DryRunBackend;
pub use error::{BackendError, BackendResult, LaunchError, LaunchResult};
pub use orchestrator::{
    COMMAND_FILE, LaunchConfig, LaunchPhase, LaunchReport, Orchestrator, SpawnFailure,
};
pub use preflight::{HostProbe, VirtualizationProbe};
pub use process::ProcessBackend;
pub use registry::Registry;
pub use spawn::{SpawnInstruction, SpawnTarget};
