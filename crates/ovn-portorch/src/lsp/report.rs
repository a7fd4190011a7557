//! Per-unit reconcile results.

use crate::vif::VifBinding;
use ovn_orch_common::TaskStatus;
use ovn_types::{NetworkId, PortId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to one northbound object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// The row was written
    Applied,
    /// The row already matched; nothing written
    Unchanged,
    /// The ledger already holds an equal or newer revision
    Stale,
    /// The row was removed
    Deleted,
    /// Input was inconsistent; the previous row was kept
    Rejected(String),
    /// The backend kept failing; the previous row was kept
    Failed(String),
}

impl Outcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Outcome::Applied | Outcome::Deleted => TaskStatus::Success,
            Outcome::Unchanged => TaskStatus::Unchanged,
            Outcome::Stale => TaskStatus::Stale,
            Outcome::Rejected(_) => TaskStatus::InvalidEntry,
            Outcome::Failed(_) => TaskStatus::Failed,
        }
    }

    /// Returns true if the backend was modified.
    pub fn wrote(&self) -> bool {
        matches!(self, Outcome::Applied | Outcome::Deleted)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied => write!(f, "applied"),
            Outcome::Unchanged => write!(f, "unchanged"),
            Outcome::Stale => write!(f, "stale"),
            Outcome::Deleted => write!(f, "deleted"),
            Outcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Kind of northbound object an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    LogicalSwitchPort,
    DhcpOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectOutcome {
    pub object_id: String,
    pub kind: ObjectKind,
    pub outcome: Outcome,
}

/// Result of one unit of work on a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub network_id: NetworkId,
    pub outcomes: Vec<ObjectOutcome>,
    /// Bindings published to the tenant layer during the unit
    pub bindings: Vec<(PortId, VifBinding)>,
}

impl ReconcileReport {
    pub fn new(network_id: impl Into<NetworkId>) -> Self {
        Self {
            network_id: network_id.into(),
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, object_id: impl Into<String>, kind: ObjectKind, outcome: Outcome) {
        self.outcomes.push(ObjectOutcome {
            object_id: object_id.into(),
            kind,
            outcome,
        });
    }

    /// Last outcome recorded for a logical switch port.
    pub fn port_outcome(&self, port_id: &str) -> Option<&Outcome> {
        self.outcome_for(port_id, ObjectKind::LogicalSwitchPort)
    }

    /// Last outcome recorded for a subnet's DHCP options.
    pub fn dhcp_outcome(&self, subnet_id: &str) -> Option<&Outcome> {
        self.outcome_for(subnet_id, ObjectKind::DhcpOptions)
    }

    fn outcome_for(&self, object_id: &str, kind: ObjectKind) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.object_id == object_id && o.kind == kind)
            .map(|o| &o.outcome)
    }

    pub fn binding_for(&self, port_id: &str) -> Option<&VifBinding> {
        self.bindings
            .iter()
            .rev()
            .find(|(id, _)| id == port_id)
            .map(|(_, b)| b)
    }

    /// Number of backend writes the unit performed.
    pub fn writes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.wrote()).count()
    }

    /// Returns true if no object failed or was rejected.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_status() {
        assert_eq!(Outcome::Applied.status(), TaskStatus::Success);
        assert_eq!(Outcome::Unchanged.status(), TaskStatus::Unchanged);
        assert_eq!(Outcome::Stale.status(), TaskStatus::Stale);
        assert_eq!(Outcome::Rejected("x".into()).status(), TaskStatus::InvalidEntry);
        assert!(Outcome::Failed("x".into()).status().is_failure());
    }

    #[test]
    fn test_report_lookup_uses_latest() {
        let mut report = ReconcileReport::new("n1");
        report.record("p1", ObjectKind::LogicalSwitchPort, Outcome::Unchanged);
        report.record("p1", ObjectKind::LogicalSwitchPort, Outcome::Applied);
        report.record("s1", ObjectKind::DhcpOptions, Outcome::Applied);

        assert_eq!(report.port_outcome("p1"), Some(&Outcome::Applied));
        assert_eq!(report.dhcp_outcome("s1"), Some(&Outcome::Applied));
        assert_eq!(report.port_outcome("s1"), None);
        assert_eq!(report.writes(), 2);
        assert!(report.is_success());
    }

    #[test]
    fn test_report_failure() {
        let mut report = ReconcileReport::new("n1");
        report.record("p1", ObjectKind::LogicalSwitchPort, Outcome::Failed("down".into()));
        assert!(!report.is_success());
        assert_eq!(report.writes(), 0);
    }
}
