//! HaChassisGroupOrch - default HA chassis group ownership.
//!
//! External ports reference one process-wide group. This Orch makes sure the
//! group exists before any external row is written and, on the maintenance
//! timer, repairs drift between the rows that reference the group and the
//! group's membership on the backend.

mod orch;
mod types;

pub use orch::{
    HaChassisGroupOrch, HaChassisGroupOrchConfig, HaChassisGroupOrchError,
    HaChassisGroupOrchStats,
};
pub use types::{HaChassisGroupEntry, SyncSummary};
