//! Reconciliation engine.
//!
//! Turns one event into the minimal set of northbound writes. The engine
//! holds no per-network state itself; the caller passes the
//! [`NetworkState`] owned by the network's worker, so two events of the same
//! network never run at the same time.

use super::classifier::{classify, ClassifierContext, ClassifyError};
use super::index::{AddressIndex, IndexDelta};
use super::report::{ObjectKind, Outcome, ReconcileReport};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::backend::{BackendPortStore, ChassisDirectory, RevisionLedger, TenantStore};
use crate::config::PortOrchConfig;
use crate::dhcp::DhcpMtuSync;
use crate::dispatch::Event;
use crate::error::BackendError;
use crate::vif::decide_binding;
use ovn_orch_common::{RetryError, RetryPolicy};
use ovn_types::{Network, NetworkId, Port, PortField, PortId};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const SOURCE: &str = "LspEngine";

/// Why a unit (or one object within it) could not be applied.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("{0}")]
    Backend(#[from] RetryError<BackendError>),

    #[error("Network {0} not found")]
    NetworkNotFound(NetworkId),
}

impl ReconcileError {
    /// Rejections are input problems; everything else is a backend failure.
    pub fn into_outcome(self) -> Outcome {
        match self {
            ReconcileError::Classify(_) | ReconcileError::NetworkNotFound(_) => {
                Outcome::Rejected(self.to_string())
            }
            ReconcileError::Backend(_) => Outcome::Failed(self.to_string()),
        }
    }
}

/// Handles to every collaborator the reconciler talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub tenant: Arc<dyn TenantStore>,
    pub ledger: Arc<dyn RevisionLedger>,
    pub backend: Arc<dyn BackendPortStore>,
    pub chassis: Arc<dyn ChassisDirectory>,
}

/// Engine settings, taken from [`PortOrchConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_ha_chassis_group: String,
    pub vhost_sock_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl EngineConfig {
    pub fn from_config(config: &PortOrchConfig) -> Self {
        Self {
            default_ha_chassis_group: config.ovn.default_ha_chassis_group.clone(),
            vhost_sock_dir: config.ovn.vhost_sock_dir.clone(),
            retry: config.retry.policy(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&PortOrchConfig::default())
    }
}

/// Everything the engine knows about one network between events.
#[derive(Debug)]
pub struct NetworkState {
    pub network_id: NetworkId,
    primed: bool,
    index: AddressIndex,
    /// Last seen tenant version of each port
    ports: HashMap<PortId, Port>,
    /// Ports whose row failed to apply as a side effect of another port
    dirty: BTreeSet<PortId>,
}

impl NetworkState {
    pub fn new(network_id: impl Into<NetworkId>) -> Self {
        Self {
            network_id: network_id.into(),
            primed: false,
            index: AddressIndex::new(),
            ports: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Returns true once the state was loaded from the tenant store.
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn index(&self) -> &AddressIndex {
        &self.index
    }

    pub fn port(&self, port_id: &str) -> Option<&Port> {
        self.ports.get(port_id)
    }

    pub fn port_ids(&self) -> impl Iterator<Item = &PortId> {
        self.ports.keys()
    }

    /// Ports waiting for their row to be retried.
    pub fn dirty(&self) -> &BTreeSet<PortId> {
        &self.dirty
    }

    fn track(&mut self, port_id: &str, outcome: &Outcome) {
        if matches!(outcome, Outcome::Failed(_)) {
            self.dirty.insert(port_id.to_string());
        } else {
            self.dirty.remove(port_id);
        }
    }
}

/// Which check protects a row write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteGuard {
    /// No-op detection plus the revision ledger
    Ledger,
    /// No-op detection only; used for rows rewritten because a peer changed
    Content,
}

/// Computes and applies logical switch port rows.
pub struct LspEngine {
    config: EngineConfig,
    tenant: Arc<dyn TenantStore>,
    ledger: Arc<dyn RevisionLedger>,
    backend: Arc<dyn BackendPortStore>,
    chassis: Arc<dyn ChassisDirectory>,
    dhcp: DhcpMtuSync,
}

impl LspEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let dhcp = DhcpMtuSync::new(
            collaborators.backend.clone(),
            collaborators.ledger.clone(),
            config.retry,
        );
        Self {
            config,
            tenant: collaborators.tenant,
            ledger: collaborators.ledger,
            backend: collaborators.backend,
            chassis: collaborators.chassis,
            dhcp,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one unit of work for `event` against `state`.
    #[instrument(skip(self, state), fields(network = %state.network_id))]
    pub async fn handle(&self, state: &mut NetworkState, event: &Event) -> ReconcileReport {
        let mut report = ReconcileReport::new(state.network_id.clone());

        if let Err(e) = self.run_event(state, event, &mut report).await {
            warn!(event = %event, error = %e, "Unit could not be applied");
            report.record(event.object_id(), event.object_kind(), e.into_outcome());
        }

        debug!(
            event = %event,
            outcomes = report.outcomes.len(),
            writes = report.writes(),
            "Unit finished"
        );
        report
    }

    async fn run_event(
        &self,
        state: &mut NetworkState,
        event: &Event,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        if !state.primed {
            let skip = match event {
                Event::PortChanged { port_id, .. } => Some(port_id.as_str()),
                _ => None,
            };
            self.prime(state, skip, report).await?;
        }
        self.retry_dirty(state, report).await?;

        match event {
            Event::PortChanged {
                port_id,
                changed_fields,
            } => self.port_changed(state, port_id, changed_fields, report).await,
            Event::PortDeleted { port_id } => self.port_deleted(state, port_id, report).await,
            Event::NetworkChanged { .. } => self.network_changed(state, report).await,
        }
    }

    /// Loads every tenant port of the network and resyncs their rows.
    ///
    /// `skip` names the port the triggering event is about; it is indexed
    /// but left for the event itself to reconcile.
    async fn prime(
        &self,
        state: &mut NetworkState,
        skip: Option<&str>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let network_id = state.network_id.clone();
        let ports = self
            .config
            .retry
            .run("list_ports", || self.tenant.list_ports(&network_id))
            .await?;

        for port in &ports {
            state.index.apply_port(None, port);
            state.ports.insert(port.id.clone(), port.clone());
        }
        state.primed = true;
        info!(network = %network_id, ports = ports.len(), "Network state primed");

        let Some(network) = self.load_network(&network_id).await? else {
            debug!(network = %network_id, "Network not found, skipping resync");
            return Ok(());
        };

        // Rows are recomputed from current tenant state, not from an event.
        for port in ports.iter().filter(|p| Some(p.id.as_str()) != skip) {
            let outcome = self
                .reconcile_port(state, &network, port, WriteGuard::Content)
                .await;
            state.track(&port.id, &outcome);
            report.record(&port.id, ObjectKind::LogicalSwitchPort, outcome);
        }
        Ok(())
    }

    /// Re-applies rows that failed in an earlier unit.
    async fn retry_dirty(
        &self,
        state: &mut NetworkState,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        if state.dirty.is_empty() {
            return Ok(());
        }
        let Some(network) = self.load_network(&state.network_id).await? else {
            return Ok(());
        };

        let pending = std::mem::take(&mut state.dirty);
        debug!(network = %state.network_id, ports = pending.len(), "Retrying failed rows");
        for port_id in pending {
            let Some(port) = state.ports.get(&port_id).cloned() else {
                continue;
            };
            let outcome = self
                .reconcile_port(state, &network, &port, WriteGuard::Content)
                .await;
            state.track(&port_id, &outcome);
            report.record(&port_id, ObjectKind::LogicalSwitchPort, outcome);
        }
        Ok(())
    }

    async fn port_changed(
        &self,
        state: &mut NetworkState,
        port_id: &str,
        event_fields: &BTreeSet<PortField>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let fetched = self
            .config
            .retry
            .run("get_port", || self.tenant.get_port(port_id))
            .await?;
        let Some(port) = fetched else {
            debug!(port = port_id, "Port vanished before its update ran, deleting");
            return self.port_deleted(state, port_id, report).await;
        };

        let network = self
            .load_network(&state.network_id)
            .await?
            .ok_or_else(|| ReconcileError::NetworkNotFound(state.network_id.clone()))?;

        let previous = state.ports.get(port_id).cloned();
        let mut fields = event_fields.clone();
        match &previous {
            None => fields.extend(PortField::ALL),
            Some(old) => fields.extend(port.changed_fields(old)),
        }

        let delta = if fields.iter().any(PortField::affects_addresses) {
            state.index.apply_port(previous.as_ref(), &port)
        } else {
            IndexDelta::default()
        };
        state.ports.insert(port.id.clone(), port.clone());

        if fields.iter().any(PortField::affects_classification) {
            let outcome = self
                .reconcile_port(state, &network, &port, WriteGuard::Ledger)
                .await;
            report.record(&port.id, ObjectKind::LogicalSwitchPort, outcome);
        }

        self.reconcile_peers(state, &network, port_id, &delta, report)
            .await;

        if fields.contains(&PortField::Host) {
            self.bind_vif(&port, report).await;
        }
        Ok(())
    }

    async fn port_deleted(
        &self,
        state: &mut NetworkState,
        port_id: &str,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        state.dirty.remove(port_id);
        if let Some(snapshot) = state.ports.remove(port_id) {
            let delta = state.index.forget_port(&snapshot);
            match self.load_network(&state.network_id).await? {
                Some(network) => {
                    self.reconcile_peers(state, &network, port_id, &delta, report)
                        .await
                }
                None => debug!(
                    network = %state.network_id,
                    "Network gone, peers of deleted port not reconciled"
                ),
            }
        }

        let result = self
            .config
            .retry
            .run("delete_port", || self.backend.delete_port(port_id))
            .await;

        let outcome = match result {
            Ok(()) => {
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceDelete,
                    SOURCE,
                    "delete_port"
                )
                .with_outcome(AuditOutcome::Success)
                .with_object_id(port_id)
                .with_object_type("logical_switch_port"));

                if let Err(e) = self
                    .config
                    .retry
                    .run("delete_revision", || self.ledger.delete_revision(port_id))
                    .await
                {
                    warn!(port = port_id, error = %e, "Failed to drop revision row");
                }
                Outcome::Deleted
            }
            Err(e) => {
                audit_log!(AuditRecord::new(
                    AuditCategory::ResourceDelete,
                    SOURCE,
                    "delete_port"
                )
                .with_object_id(port_id)
                .with_object_type("logical_switch_port")
                .with_error(e.to_string()));
                ReconcileError::from(e).into_outcome()
            }
        };
        report.record(port_id, ObjectKind::LogicalSwitchPort, outcome);
        Ok(())
    }

    async fn network_changed(
        &self,
        state: &NetworkState,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let network = self
            .load_network(&state.network_id)
            .await?
            .ok_or_else(|| ReconcileError::NetworkNotFound(state.network_id.clone()))?;

        for (subnet_id, outcome) in self.dhcp.sync(&network).await {
            report.record(subnet_id, ObjectKind::DhcpOptions, outcome);
        }
        Ok(())
    }

    /// Re-derives rows of ports whose type may depend on `delta`.
    ///
    /// Affected are the owners of touched addresses and any port that lost
    /// a fixed IP to `changed`. One peer failing does not stop the others;
    /// failed peers are retried at the start of the next unit.
    async fn reconcile_peers(
        &self,
        state: &mut NetworkState,
        network: &Network,
        changed: &str,
        delta: &IndexDelta,
        report: &mut ReconcileReport,
    ) {
        let mut peers: Vec<PortId> = Vec::new();
        let owners = delta
            .touched_ips
            .iter()
            .filter_map(|ip| state.index.find_owner(ip))
            .chain(delta.displaced_owners.iter());
        for owner in owners {
            if owner != changed && !peers.contains(owner) {
                peers.push(owner.clone());
            }
        }

        for peer_id in peers {
            let Some(peer) = state.ports.get(&peer_id).cloned() else {
                debug!(port = %peer_id, "Peer not known in this network, skipping");
                continue;
            };
            let outcome = self
                .reconcile_port(state, network, &peer, WriteGuard::Content)
                .await;
            state.track(&peer_id, &outcome);
            report.record(&peer_id, ObjectKind::LogicalSwitchPort, outcome);
        }
    }

    async fn reconcile_port(
        &self,
        state: &NetworkState,
        network: &Network,
        port: &Port,
        guard: WriteGuard,
    ) -> Outcome {
        match self.try_reconcile_port(state, network, port, guard).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(port = %port.id, error = %e, "Port row not applied");
                e.into_outcome()
            }
        }
    }

    async fn try_reconcile_port(
        &self,
        state: &NetworkState,
        network: &Network,
        port: &Port,
        guard: WriteGuard,
    ) -> Result<Outcome, ReconcileError> {
        let ctx = ClassifierContext {
            network,
            default_ha_chassis_group: &self.config.default_ha_chassis_group,
        };
        let classification = classify(port, &state.index, &ctx)?;
        let row = classification.to_row(&port.id);

        let current = self
            .config
            .retry
            .run("get_port", || self.backend.get_port(&port.id))
            .await?;
        if current.as_ref() == Some(&row) {
            debug!(port = %port.id, "Row already up to date");
            return Ok(Outcome::Unchanged);
        }

        let mut guard = guard;
        if guard == WriteGuard::Ledger {
            let applied = self
                .config
                .retry
                .run("get_revision", || self.ledger.get_revision(&port.id))
                .await?;
            match applied {
                Some(applied) if applied.revision > port.revision_number => {
                    debug!(
                        port = %port.id,
                        applied = applied.revision,
                        revision = port.revision_number,
                        "Newer revision already applied"
                    );
                    return Ok(Outcome::Stale);
                }
                // This revision's own fields were applied; the difference
                // comes from peers, so rewrite without a ledger bump.
                Some(applied) if applied.revision == port.revision_number => {
                    debug!(
                        port = %port.id,
                        revision = port.revision_number,
                        "Revision already applied, repairing peer-derived fields"
                    );
                    guard = WriteGuard::Content;
                }
                _ => {}
            }
        }

        let category = if current.is_none() {
            AuditCategory::ResourceCreate
        } else {
            AuditCategory::ResourceModify
        };
        let details = serde_json::json!({
            "type": row.lsp_type.as_str(),
            "options": &row.options,
            "ha_chassis_group": &row.ha_chassis_group,
            "revision": port.revision_number,
        });

        let written = self
            .config
            .retry
            .run("put_port", || self.backend.put_port(row.clone()))
            .await;
        if let Err(e) = written {
            audit_log!(AuditRecord::new(category, SOURCE, "put_port")
                .with_object_id(&port.id)
                .with_object_type("logical_switch_port")
                .with_details(details)
                .with_error(e.to_string()));
            return Err(e.into());
        }
        audit_log!(AuditRecord::new(category, SOURCE, "put_port")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(&port.id)
            .with_object_type("logical_switch_port")
            .with_details(details));

        if guard == WriteGuard::Ledger {
            self.config
                .retry
                .run("bump_revision", || {
                    self.ledger.bump_if_newer(&port.id, port.revision_number)
                })
                .await?;
        }

        info!(
            port = %port.id,
            lsp_type = %classification.lsp_type(),
            "Logical switch port applied"
        );
        Ok(Outcome::Applied)
    }

    /// Decides and publishes the VIF binding of `port`.
    ///
    /// Lookup or publish failures are logged; the previous binding stays.
    async fn bind_vif(&self, port: &Port, report: &mut ReconcileReport) {
        let host = port.host.as_deref().filter(|h| !h.is_empty());
        let chassis = match host {
            Some(hostname) => {
                match self
                    .config
                    .retry
                    .run("find_chassis", || self.chassis.find_chassis(hostname))
                    .await
                {
                    Ok(chassis) => chassis,
                    Err(e) => {
                        warn!(port = %port.id, host = hostname, error = %e, "Chassis lookup failed");
                        return;
                    }
                }
            }
            None => None,
        };

        let binding = decide_binding(
            &port.id,
            host,
            chassis.as_ref(),
            &self.config.vhost_sock_dir,
        );

        let published = self
            .config
            .retry
            .run("set_port_binding", || {
                self.tenant.set_port_binding(&port.id, binding.clone())
            })
            .await;
        match published {
            Ok(()) => {
                info!(port = %port.id, vif_type = %binding.vif_type, "Port binding published");
                report.bindings.push((port.id.clone(), binding));
            }
            Err(e) => warn!(port = %port.id, error = %e, "Failed to publish port binding"),
        }
    }

    async fn load_network(&self, network_id: &str) -> Result<Option<Network>, ReconcileError> {
        Ok(self
            .config
            .retry
            .run("get_network", || self.tenant.get_network(network_id))
            .await?)
    }
}
