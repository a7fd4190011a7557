//! Change events accepted by the dispatcher.

use crate::lsp::ObjectKind;
use ovn_types::{NetworkId, PortField, PortId};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A port was created or updated. Creation is detected by the engine.
    PortChanged {
        port_id: PortId,
        changed_fields: BTreeSet<PortField>,
    },
    PortDeleted {
        port_id: PortId,
    },
    /// Network attributes (MTU) changed.
    NetworkChanged {
        network_id: NetworkId,
    },
}

impl Event {
    /// Identifier of the object the event is about.
    pub fn object_id(&self) -> &str {
        match self {
            Event::PortChanged { port_id, .. } | Event::PortDeleted { port_id } => port_id,
            Event::NetworkChanged { network_id } => network_id,
        }
    }

    /// Northbound object kind the event primarily affects.
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Event::PortChanged { .. } | Event::PortDeleted { .. } => ObjectKind::LogicalSwitchPort,
            Event::NetworkChanged { .. } => ObjectKind::DhcpOptions,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::PortChanged {
                port_id,
                changed_fields,
            } => write!(f, "port_changed({}, {:?})", port_id, changed_fields),
            Event::PortDeleted { port_id } => write!(f, "port_deleted({})", port_id),
            Event::NetworkChanged { network_id } => write!(f, "network_changed({})", network_id),
        }
    }
}
