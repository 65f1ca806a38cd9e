//! redb table definitions for the schedule store.
//!
//! Keys are node names or VM UUIDs; values are JSON records.

use redb::TableDefinition;

/// Encoded node schedules keyed by node name.
pub const SCHEDULES: TableDefinition<&str, &[u8]> = TableDefinition::new("schedules");

/// VM identity records keyed by UUID, read by the agents to find their node.
pub const VM_MAPPINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("vm_mappings");
