//! Test fixtures for reconciler scenarios
//!
//! [`ScenarioEnv`] drives tenant changes through the real [`Dispatcher`] the
//! way the tenant notification path would: mutate the tenant store first,
//! then submit the event and wait for its report.

use ovn_portorch::backend::{BackendPortStore, Chassis};
use ovn_portorch::dispatch::DispatchError;
use ovn_portorch::lsp::Collaborators;
use ovn_portorch::memory::{
    MemoryBackend, MemoryChassisDirectory, MemoryRevisionLedger, MemoryTenantStore,
};
use ovn_portorch::{BackendError, Dispatcher, PortOrchConfig, ReconcileReport};
use ovn_types::{Network, Port, PortField};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Scenario setup and driving errors
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Port '{0}' does not exist in the tenant store")]
    UnknownPort(String),

    #[error("Network '{0}' does not exist in the tenant store")]
    UnknownNetwork(String),
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// Dispatcher plus in-memory collaborators.
pub struct ScenarioEnv {
    pub tenant: Arc<MemoryTenantStore>,
    pub ledger: Arc<MemoryRevisionLedger>,
    pub backend: Arc<MemoryBackend>,
    pub chassis: Arc<MemoryChassisDirectory>,
    pub dispatcher: Dispatcher,
    config: PortOrchConfig,
}

impl ScenarioEnv {
    /// Starts an environment with fast retries and the default group present.
    pub async fn start() -> ScenarioResult<Self> {
        Self::with_config(fast_config()).await
    }

    pub async fn with_config(config: PortOrchConfig) -> ScenarioResult<Self> {
        let tenant = Arc::new(MemoryTenantStore::new());
        let ledger = Arc::new(MemoryRevisionLedger::new());
        let backend = Arc::new(MemoryBackend::new());
        let chassis = Arc::new(MemoryChassisDirectory::new());

        backend
            .ensure_group(&config.ovn.default_ha_chassis_group)
            .await?;

        let dispatcher = Dispatcher::new(
            &config,
            Collaborators {
                tenant: tenant.clone(),
                ledger: ledger.clone(),
                backend: backend.clone(),
                chassis: chassis.clone(),
            },
        );

        Ok(Self {
            tenant,
            ledger,
            backend,
            chassis,
            dispatcher,
            config,
        })
    }

    pub fn config(&self) -> &PortOrchConfig {
        &self.config
    }

    pub fn default_group(&self) -> &str {
        &self.config.ovn.default_ha_chassis_group
    }

    /// Adds a network to the tenant store without submitting an event.
    pub fn create_network(&self, network: Network) {
        self.tenant.upsert_network(network);
    }

    pub fn add_chassis(&self, chassis: Chassis) {
        self.chassis.add_chassis(chassis);
    }

    /// Creates a port and reconciles it.
    pub async fn create_port(&self, port: Port) -> ScenarioResult<ReconcileReport> {
        let port_id = port.id.clone();
        debug!(port = %port_id, "Scenario: create port");
        self.tenant.create_port(port);
        self.resubmit(&port_id, PortField::ALL).await
    }

    /// Applies `update` to a port and reconciles the fields it changed.
    pub async fn update_port<F>(&self, port_id: &str, update: F) -> ScenarioResult<ReconcileReport>
    where
        F: FnOnce(&mut Port),
    {
        let changed = self
            .tenant
            .update_port(port_id, update)
            .ok_or_else(|| ScenarioError::UnknownPort(port_id.to_string()))?;
        debug!(port = %port_id, changed = ?changed, "Scenario: update port");
        let report = self
            .dispatcher
            .on_port_changed(port_id, changed)
            .await?
            .wait()
            .await?;
        Ok(report)
    }

    /// Submits a port event without touching the tenant store.
    pub async fn resubmit<I>(&self, port_id: &str, fields: I) -> ScenarioResult<ReconcileReport>
    where
        I: IntoIterator<Item = PortField>,
    {
        let fields: BTreeSet<PortField> = fields.into_iter().collect();
        let report = self
            .dispatcher
            .on_port_changed(port_id, fields)
            .await?
            .wait()
            .await?;
        Ok(report)
    }

    pub async fn delete_port(&self, port_id: &str) -> ScenarioResult<ReconcileReport> {
        debug!(port = %port_id, "Scenario: delete port");
        self.tenant.delete_port(port_id);
        let report = self.dispatcher.on_port_deleted(port_id).await?.wait().await?;
        Ok(report)
    }

    /// Changes a network's MTU and reconciles its DHCP options.
    pub async fn set_network_mtu(&self, network_id: &str, mtu: u32) -> ScenarioResult<ReconcileReport> {
        if !self.tenant.update_network(network_id, |n| n.mtu = mtu) {
            return Err(ScenarioError::UnknownNetwork(network_id.to_string()));
        }
        debug!(network = %network_id, mtu, "Scenario: set network MTU");
        let report = self
            .dispatcher
            .on_network_changed(network_id)
            .await?
            .wait()
            .await?;
        Ok(report)
    }
}

/// Default configuration with millisecond retry backoff.
pub fn fast_config() -> PortOrchConfig {
    let mut config = PortOrchConfig::default();
    config.retry.max_attempts = 4;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 4;
    config
}

/// Common tenant port shapes
pub mod port_fixtures {
    use ovn_types::{Capability, Port, VnicType};
    use std::net::IpAddr;

    /// Plain VM port with one fixed IP
    pub fn vm_port(port_id: &str, network_id: &str, ip: IpAddr) -> Port {
        Port::new(port_id, network_id).with_fixed_ip(ip)
    }

    /// SR-IOV VF port without hardware offload
    pub fn sriov_port(port_id: &str, network_id: &str, ip: IpAddr) -> Port {
        vm_port(port_id, network_id, ip).with_vnic_type(VnicType::Direct)
    }

    /// SR-IOV VF port on a NIC in switchdev mode
    pub fn offloaded_sriov_port(port_id: &str, network_id: &str, ip: IpAddr) -> Port {
        sriov_port(port_id, network_id, ip).with_capability(Capability::Switchdev)
    }

    /// Member of a keepalived-style pair that may answer for `vip`
    pub fn vrrp_member(port_id: &str, network_id: &str, ip: IpAddr, vip: IpAddr) -> Port {
        vm_port(port_id, network_id, ip).with_allowed_address(vip)
    }

    /// Port bound to `host`
    pub fn bound_port(port_id: &str, network_id: &str, ip: IpAddr, host: &str) -> Port {
        vm_port(port_id, network_id, ip).with_host(host)
    }
}

/// Common tenant network shapes
pub mod network_fixtures {
    use ovn_types::{IpPrefix, Network};

    pub fn tenant_network(network_id: &str, cidr: IpPrefix) -> Network {
        Network::new(network_id).with_subnet(cidr)
    }

    pub fn dual_stack_network(network_id: &str, v4: IpPrefix, v6: IpPrefix) -> Network {
        Network::new(network_id).with_subnet(v4).with_subnet(v6)
    }
}

/// Chassis as registered by `ovn-controller`
pub mod chassis_fixtures {
    use ovn_portorch::backend::Chassis;
    use std::collections::BTreeMap;

    /// Kernel datapath host
    pub fn system_chassis(hostname: &str) -> Chassis {
        let mut ids = BTreeMap::new();
        ids.insert("datapath-type".to_string(), "system".to_string());
        ids.insert("iface-types".to_string(), "geneve,internal,system".to_string());
        Chassis::from_external_ids(hostname, &ids)
    }

    /// OVS-DPDK host with vhost-user support
    pub fn dpdk_chassis(hostname: &str) -> Chassis {
        let mut ids = BTreeMap::new();
        ids.insert("datapath-type".to_string(), "netdev".to_string());
        ids.insert(
            "iface-types".to_string(),
            "dpdk,dpdkvhostuser,dpdkvhostuserclient,geneve".to_string(),
        );
        Chassis::from_external_ids(hostname, &ids)
    }
}
