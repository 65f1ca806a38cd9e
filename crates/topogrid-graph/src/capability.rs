//! Node capability tags.
//!
//! Each exclusive group (OS family, role) holds at most one value. Adding a
//! second, different value from the same group is rejected instead of
//! silently overwriting the first.

use std::fmt;

use serde::{Deserialize, Serialize};

use topo_core::{NodeRole, OsFamily};

use crate::error::{GraphError, GraphResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    Os(OsFamily),
    Role(NodeRole),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Os(OsFamily::Unix) => f.write_str("unix"),
            Capability::Os(OsFamily::Windows) => f.write_str("windows"),
            Capability::Role(NodeRole::Server) => f.write_str("server"),
            Capability::Role(NodeRole::Desktop) => f.write_str("desktop"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    os: Option<OsFamily>,
    role: Option<NodeRole>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability. Re-adding the value already held is a no-op.
    pub fn add(&mut self, capability: Capability) -> GraphResult<()> {
        match capability {
            Capability::Os(os) => Self::fill(&mut self.os, os, Capability::Os),
            Capability::Role(role) => Self::fill(&mut self.role, role, Capability::Role),
        }
    }

    fn fill<T: Copy + PartialEq>(
        slot: &mut Option<T>,
        value: T,
        wrap: fn(T) -> Capability,
    ) -> GraphResult<()> {
        match *slot {
            Some(existing) if existing != value => Err(GraphError::CapabilityConflict {
                existing: wrap(existing).to_string(),
                requested: wrap(value).to_string(),
            }),
            _ => {
                *slot = Some(value);
                Ok(())
            }
        }
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Os(os) => self.os == Some(os),
            Capability::Role(role) => self.role == Some(role),
        }
    }

    pub fn os(&self) -> Option<OsFamily> {
        self.os
    }

    pub fn role(&self) -> Option<NodeRole> {
        self.role
    }

    /// OS family used for guest commands; nodes without one are treated as Unix.
    pub fn os_family(&self) -> OsFamily {
        self.os.unwrap_or(OsFamily::Unix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_os_is_rejected() {
        let mut caps = CapabilitySet::new();
        caps.add(Capability::Os(OsFamily::Windows)).unwrap();
        let err = caps.add(Capability::Os(OsFamily::Unix)).unwrap_err();
        assert!(matches!(
            err,
            GraphError::CapabilityConflict { ref existing, ref requested }
                if existing == "windows" && requested == "unix"
        ));
        assert_eq!(caps.os(), Some(OsFamily::Windows));
    }

    #[test]
    fn groups_are_independent() {
        let mut caps = CapabilitySet::new();
        caps.add(Capability::Os(OsFamily::Unix)).unwrap();
        caps.add(Capability::Role(NodeRole::Server)).unwrap();
        caps.add(Capability::Os(OsFamily::Unix)).unwrap();
        assert!(caps.contains(Capability::Role(NodeRole::Server)));
        assert!(matches!(
            caps.add(Capability::Role(NodeRole::Desktop)),
            Err(GraphError::CapabilityConflict { .. })
        ));
    }

    #[test]
    fn os_family_defaults_to_unix() {
        assert_eq!(CapabilitySet::new().os_family(), OsFamily::Unix);
    }
}
