//! In-memory collaborators.
//!
//! Process-local implementations of the traits in [`crate::backend`], used
//! by the daemon's standalone mode and by tests. The northbound store can be
//! told to fail writes to exercise the retry path.

use crate::backend::{
    BackendPortStore, BackendResult, Chassis, ChassisDirectory, DhcpOptions, LogicalSwitchPort,
    RevisionLedger, RevisionRow, TenantStore,
};
use crate::error::BackendError;
use crate::vif::VifBinding;
use async_trait::async_trait;
use chrono::Utc;
use ovn_types::{Network, NetworkId, Port, PortField, PortId, SubnetId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Tenant ports, networks and published bindings.
#[derive(Debug, Default)]
pub struct MemoryTenantStore {
    ports: RwLock<BTreeMap<PortId, Port>>,
    networks: RwLock<BTreeMap<NetworkId, Network>>,
    bindings: RwLock<BTreeMap<PortId, VifBinding>>,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a port as given.
    pub fn create_port(&self, port: Port) {
        self.ports.write().insert(port.id.clone(), port);
    }

    /// Applies `update` to a stored port and bumps its revision.
    ///
    /// Returns the fields that changed, or `None` if the port is unknown.
    pub fn update_port<F>(&self, port_id: &str, update: F) -> Option<BTreeSet<PortField>>
    where
        F: FnOnce(&mut Port),
    {
        let mut ports = self.ports.write();
        let port = ports.get_mut(port_id)?;
        let before = port.clone();
        update(port);
        port.revision_number = before.revision_number + 1;
        Some(port.changed_fields(&before))
    }

    pub fn delete_port(&self, port_id: &str) -> Option<Port> {
        self.bindings.write().remove(port_id);
        self.ports.write().remove(port_id)
    }

    pub fn upsert_network(&self, network: Network) {
        self.networks.write().insert(network.id.clone(), network);
    }

    /// Applies `update` to a stored network and bumps its revision.
    pub fn update_network<F>(&self, network_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut Network),
    {
        let mut networks = self.networks.write();
        match networks.get_mut(network_id) {
            Some(network) => {
                update(network);
                network.revision_number += 1;
                true
            }
            None => false,
        }
    }

    /// Last binding published for a port.
    pub fn binding(&self, port_id: &str) -> Option<VifBinding> {
        self.bindings.read().get(port_id).cloned()
    }

    pub fn port(&self, port_id: &str) -> Option<Port> {
        self.ports.read().get(port_id).cloned()
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn get_port(&self, port_id: &str) -> BackendResult<Option<Port>> {
        Ok(self.port(port_id))
    }

    async fn get_network(&self, network_id: &str) -> BackendResult<Option<Network>> {
        Ok(self.networks.read().get(network_id).cloned())
    }

    async fn list_ports(&self, network_id: &NetworkId) -> BackendResult<Vec<Port>> {
        Ok(self
            .ports
            .read()
            .values()
            .filter(|p| &p.network_id == network_id)
            .cloned()
            .collect())
    }

    async fn set_port_binding(&self, port_id: &str, binding: VifBinding) -> BackendResult<()> {
        if !self.ports.read().contains_key(port_id) {
            return Err(BackendError::not_found("port", port_id));
        }
        self.bindings.write().insert(port_id.to_string(), binding);
        Ok(())
    }
}

/// Revision ledger keyed by object id.
#[derive(Debug, Default)]
pub struct MemoryRevisionLedger {
    rows: Mutex<BTreeMap<String, RevisionRow>>,
}

impl MemoryRevisionLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevisionLedger for MemoryRevisionLedger {
    async fn get_revision(&self, object_id: &str) -> BackendResult<Option<RevisionRow>> {
        Ok(self.rows.lock().get(object_id).cloned())
    }

    async fn bump_if_newer(&self, object_id: &str, revision: u64) -> BackendResult<bool> {
        let mut rows = self.rows.lock();
        match rows.get_mut(object_id) {
            Some(row) if row.revision >= revision => Ok(false),
            Some(row) => {
                row.revision = revision;
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => {
                rows.insert(
                    object_id.to_string(),
                    RevisionRow {
                        object_id: object_id.to_string(),
                        revision,
                        updated_at: Utc::now(),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn delete_revision(&self, object_id: &str) -> BackendResult<()> {
        self.rows.lock().remove(object_id);
        Ok(())
    }
}

/// Northbound store with fault injection.
///
/// Group membership follows the `ha_chassis_group` column of written rows;
/// writing a row that references a missing group is refused.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    ports: RwLock<BTreeMap<PortId, LogicalSwitchPort>>,
    groups: RwLock<BTreeMap<String, BTreeSet<PortId>>>,
    dhcp: RwLock<BTreeMap<SubnetId, DhcpOptions>>,
    failing_writes: AtomicU64,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` write calls fail as unavailable.
    pub fn fail_next_writes(&self, count: u64) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Makes every call fail as unavailable until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_read(&self, operation: &str) -> BackendResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable(operation, "store unavailable"));
        }
        Ok(())
    }

    fn check_write(&self, operation: &str) -> BackendResult<()> {
        self.check_read(operation)?;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BackendError::unavailable(operation, "injected write failure"));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendPortStore for MemoryBackend {
    async fn get_port(&self, port_id: &str) -> BackendResult<Option<LogicalSwitchPort>> {
        self.check_read("get_port")?;
        Ok(self.ports.read().get(port_id).cloned())
    }

    async fn list_ports(&self) -> BackendResult<Vec<LogicalSwitchPort>> {
        self.check_read("list_ports")?;
        Ok(self.ports.read().values().cloned().collect())
    }

    async fn put_port(&self, row: LogicalSwitchPort) -> BackendResult<()> {
        self.check_write("put_port")?;
        let mut groups = self.groups.write();

        if let Some(group) = &row.ha_chassis_group {
            if !groups.contains_key(group) {
                return Err(BackendError::not_found("ha_chassis_group", group));
            }
        }
        for members in groups.values_mut() {
            members.remove(&row.name);
        }
        if let Some(members) = row
            .ha_chassis_group
            .as_ref()
            .and_then(|group| groups.get_mut(group))
        {
            members.insert(row.name.clone());
        }

        self.ports.write().insert(row.name.clone(), row);
        self.record_write();
        Ok(())
    }

    async fn delete_port(&self, port_id: &str) -> BackendResult<()> {
        self.check_write("delete_port")?;
        for members in self.groups.write().values_mut() {
            members.remove(port_id);
        }
        if self.ports.write().remove(port_id).is_some() {
            self.record_write();
        }
        Ok(())
    }

    async fn ensure_group(&self, group: &str) -> BackendResult<bool> {
        self.check_write("ensure_group")?;
        let mut groups = self.groups.write();
        if groups.contains_key(group) {
            return Ok(false);
        }
        groups.insert(group.to_string(), BTreeSet::new());
        self.record_write();
        Ok(true)
    }

    async fn group_members(&self, group: &str) -> BackendResult<BTreeSet<PortId>> {
        self.check_read("group_members")?;
        self.groups
            .read()
            .get(group)
            .cloned()
            .ok_or_else(|| BackendError::not_found("ha_chassis_group", group))
    }

    async fn add_to_group(&self, group: &str, port_id: &str) -> BackendResult<()> {
        self.check_write("add_to_group")?;
        let mut groups = self.groups.write();
        let members = groups
            .get_mut(group)
            .ok_or_else(|| BackendError::not_found("ha_chassis_group", group))?;
        if members.insert(port_id.to_string()) {
            self.record_write();
        }
        Ok(())
    }

    async fn remove_from_group(&self, group: &str, port_id: &str) -> BackendResult<()> {
        self.check_write("remove_from_group")?;
        if let Some(members) = self.groups.write().get_mut(group) {
            if members.remove(port_id) {
                self.record_write();
            }
        }
        Ok(())
    }

    async fn get_dhcp_options(&self, subnet_id: &str) -> BackendResult<Option<DhcpOptions>> {
        self.check_read("get_dhcp_options")?;
        Ok(self.dhcp.read().get(subnet_id).cloned())
    }

    async fn put_dhcp_options(&self, options: DhcpOptions) -> BackendResult<()> {
        self.check_write("put_dhcp_options")?;
        self.dhcp.write().insert(options.subnet_id.clone(), options);
        self.record_write();
        Ok(())
    }
}

/// Registered chassis keyed by hostname.
#[derive(Debug, Default)]
pub struct MemoryChassisDirectory {
    chassis: RwLock<BTreeMap<String, Chassis>>,
}

impl MemoryChassisDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chassis(&self, chassis: Chassis) {
        self.chassis.write().insert(chassis.hostname.clone(), chassis);
    }

    pub fn remove_chassis(&self, hostname: &str) {
        self.chassis.write().remove(hostname);
    }
}

#[async_trait]
impl ChassisDirectory for MemoryChassisDirectory {
    async fn list_chassis(&self) -> BackendResult<Vec<Chassis>> {
        Ok(self.chassis.read().values().cloned().collect())
    }

    async fn find_chassis(&self, hostname: &str) -> BackendResult<Option<Chassis>> {
        Ok(self.chassis.read().get(hostname).cloned())
    }
}
