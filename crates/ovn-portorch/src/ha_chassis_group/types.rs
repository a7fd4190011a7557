//! HA chassis group types.

use chrono::{DateTime, Utc};
use ovn_types::PortId;
use std::collections::BTreeSet;

/// Local view of the default HA chassis group.
#[derive(Debug, Clone)]
pub struct HaChassisGroupEntry {
    /// Group name.
    pub name: String,
    /// Ports the backend reported as members at the last sync.
    pub members: BTreeSet<PortId>,
    /// Time of the last completed membership sync.
    pub last_sync: Option<DateTime<Utc>>,
}

impl HaChassisGroupEntry {
    /// Creates an entry with no known members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeSet::new(),
            last_sync: None,
        }
    }

    /// Adds a member. Returns true if added, false if already present.
    pub fn add_member(&mut self, port_id: &str) -> bool {
        self.members.insert(port_id.to_string())
    }

    /// Removes a member. Returns true if it was present.
    pub fn remove_member(&mut self, port_id: &str) -> bool {
        self.members.remove(port_id)
    }

    /// Checks if a port is a member.
    pub fn is_member(&self, port_id: &str) -> bool {
        self.members.contains(port_id)
    }
}

/// Changes issued by one membership sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: Vec<PortId>,
    pub removed: Vec<PortId>,
}

impl SyncSummary {
    /// Returns true if membership already matched.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
