//! Collaborator boundaries.
//!
//! The reconciler never talks to a database directly. Everything it reads or
//! writes goes through one of these traits:
//!
//! | Trait | Backs |
//! |-------|-------|
//! | [`TenantStore`] | Tenant ports and networks, port binding results |
//! | [`RevisionLedger`] | Last applied revision per object |
//! | [`BackendPortStore`] | Northbound LSP rows, HA chassis groups, DHCP options |
//! | [`ChassisDirectory`] | Registered chassis and their datapath capabilities |

use crate::error::BackendError;
use crate::lsp::LspType;
use crate::vif::VifBinding;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ovn_types::{IpPrefix, Network, NetworkId, Port, PortId, SubnetId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Result type for collaborator calls
pub type BackendResult<T> = Result<T, BackendError>;

/// A northbound logical switch port row, as far as the reconciler owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSwitchPort {
    /// Row name; equals the tenant port id
    pub name: PortId,
    #[serde(rename = "type")]
    pub lsp_type: LspType,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ha_chassis_group: Option<String>,
}

impl LogicalSwitchPort {
    /// A plain row with no options and no group.
    pub fn normal(name: impl Into<PortId>) -> Self {
        Self {
            name: name.into(),
            lsp_type: LspType::Normal,
            options: BTreeMap::new(),
            ha_chassis_group: None,
        }
    }
}

/// DHCP options row for one subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpOptions {
    pub subnet_id: SubnetId,
    pub cidr: IpPrefix,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Revision ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRow {
    pub object_id: String,
    pub revision: u64,
    /// Changes only when a bump is applied
    pub updated_at: DateTime<Utc>,
}

/// A registered chassis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chassis {
    pub hostname: String,
    /// OVS datapath type, e.g. "system" or "netdev"
    #[serde(default)]
    pub datapath_type: String,
    /// Interface types the host's OVS supports
    #[serde(default)]
    pub iface_types: Vec<String>,
}

impl Chassis {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            datapath_type: String::new(),
            iface_types: Vec::new(),
        }
    }

    /// Builds a chassis from its `external_ids` column.
    ///
    /// Reads `datapath-type` and the comma separated `iface-types`.
    pub fn from_external_ids(
        hostname: impl Into<String>,
        external_ids: &BTreeMap<String, String>,
    ) -> Self {
        let datapath_type = external_ids
            .get("datapath-type")
            .cloned()
            .unwrap_or_default();
        let iface_types = external_ids
            .get("iface-types")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            hostname: hostname.into(),
            datapath_type,
            iface_types,
        }
    }
}

/// Tenant-side source of truth.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_port(&self, port_id: &str) -> BackendResult<Option<Port>>;
    async fn get_network(&self, network_id: &str) -> BackendResult<Option<Network>>;
    async fn list_ports(&self, network_id: &NetworkId) -> BackendResult<Vec<Port>>;
    /// Publishes the binding decision for a port.
    async fn set_port_binding(&self, port_id: &str, binding: VifBinding) -> BackendResult<()>;
}

/// Apply-only-if-newer revision tracking.
#[async_trait]
pub trait RevisionLedger: Send + Sync {
    async fn get_revision(&self, object_id: &str) -> BackendResult<Option<RevisionRow>>;
    /// Records `revision` when it is newer than the stored one.
    ///
    /// Returns true if the row changed.
    async fn bump_if_newer(&self, object_id: &str, revision: u64) -> BackendResult<bool>;
    async fn delete_revision(&self, object_id: &str) -> BackendResult<()>;
}

/// Northbound store for the rows the reconciler derives.
///
/// `put_port` replaces the whole row, group reference included, in a single
/// operation. Group membership calls are idempotent set operations.
#[async_trait]
pub trait BackendPortStore: Send + Sync {
    async fn get_port(&self, port_id: &str) -> BackendResult<Option<LogicalSwitchPort>>;
    async fn list_ports(&self) -> BackendResult<Vec<LogicalSwitchPort>>;
    async fn put_port(&self, row: LogicalSwitchPort) -> BackendResult<()>;
    /// Deleting a missing row is not an error.
    async fn delete_port(&self, port_id: &str) -> BackendResult<()>;

    /// Creates the group if missing. Returns true if it was created.
    async fn ensure_group(&self, group: &str) -> BackendResult<bool>;
    async fn group_members(&self, group: &str) -> BackendResult<BTreeSet<PortId>>;
    async fn add_to_group(&self, group: &str, port_id: &str) -> BackendResult<()>;
    async fn remove_from_group(&self, group: &str, port_id: &str) -> BackendResult<()>;

    async fn get_dhcp_options(&self, subnet_id: &str) -> BackendResult<Option<DhcpOptions>>;
    async fn put_dhcp_options(&self, options: DhcpOptions) -> BackendResult<()>;
}

/// Registered chassis lookup.
#[async_trait]
pub trait ChassisDirectory: Send + Sync {
    async fn list_chassis(&self) -> BackendResult<Vec<Chassis>>;

    async fn find_chassis(&self, hostname: &str) -> BackendResult<Option<Chassis>> {
        Ok(self
            .list_chassis()
            .await?
            .into_iter()
            .find(|c| c.hostname == hostname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chassis_from_external_ids() {
        let mut ids = BTreeMap::new();
        ids.insert("datapath-type".to_string(), "netdev".to_string());
        ids.insert(
            "iface-types".to_string(),
            "dummy,dummy-internal,dpdkvhostuser".to_string(),
        );

        let chassis = Chassis::from_external_ids("dpdk-host", &ids);
        assert_eq!(chassis.hostname, "dpdk-host");
        assert_eq!(chassis.datapath_type, "netdev");
        assert_eq!(
            chassis.iface_types,
            vec!["dummy", "dummy-internal", "dpdkvhostuser"]
        );
    }

    #[test]
    fn test_chassis_from_empty_external_ids() {
        let chassis = Chassis::from_external_ids("bare", &BTreeMap::new());
        assert!(chassis.datapath_type.is_empty());
        assert!(chassis.iface_types.is_empty());
    }

    #[test]
    fn test_lsp_row_serialization() {
        let row = LogicalSwitchPort::normal("p1");
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "p1", "type": "", "options": {}})
        );
    }
}
