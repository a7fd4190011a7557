//! Per-network event dispatch.
//!
//! Events for one network run one at a time, in arrival order; events for
//! different networks run concurrently. Each network gets a lazily spawned
//! worker fed by a bounded queue. Workers retire after an idle timeout and
//! take the network's state out of the arena with them; the next event
//! primes a fresh state from the tenant store.

mod event;
mod worker;

pub use event::Event;

use crate::backend::TenantStore;
use crate::config::PortOrchConfig;
use crate::error::BackendError;
use crate::lsp::{Collaborators, EngineConfig, LspEngine, NetworkState, ReconcileReport};
use dashmap::DashMap;
use ovn_orch_common::{RetryError, RetryPolicy};
use ovn_types::{NetworkId, PortField, PortId};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};
use worker::{Envelope, Worker, WorkerHandle};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Port {0} is not known to any network")]
    UnknownPort(PortId),

    #[error("Tenant lookup failed: {0}")]
    Tenant(#[from] RetryError<BackendError>),

    #[error("Worker for network {0} stopped before reporting")]
    WorkerGone(NetworkId),

    #[error("Dispatcher is shutting down")]
    ShuttingDown,
}

/// Pending result of a submitted event.
///
/// Resolves once the network's worker ran the unit. Dropping it does not
/// cancel the unit.
pub struct Completion {
    network_id: NetworkId,
    rx: oneshot::Receiver<ReconcileReport>,
}

impl Completion {
    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    /// Waits for the unit's report.
    pub async fn wait(self) -> Result<ReconcileReport, DispatchError> {
        self.await
    }
}

impl Future for Completion {
    type Output = Result<ReconcileReport, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| DispatchError::WorkerGone(this.network_id.clone())))
    }
}

/// Routes events to per-network workers.
pub struct Dispatcher {
    engine: Arc<LspEngine>,
    tenant: Arc<dyn TenantStore>,
    retry: RetryPolicy,
    queue_depth: usize,
    idle_timeout: Duration,
    workers: Arc<DashMap<NetworkId, WorkerHandle>>,
    states: Arc<DashMap<NetworkId, Arc<Mutex<NetworkState>>>>,
    locator: Arc<DashMap<PortId, NetworkId>>,
    next_generation: AtomicU64,
    shutting_down: AtomicBool,
}

impl Dispatcher {
    pub fn new(config: &PortOrchConfig, collaborators: Collaborators) -> Self {
        let tenant = collaborators.tenant.clone();
        let engine = LspEngine::new(EngineConfig::from_config(config), collaborators);
        Self {
            engine: Arc::new(engine),
            tenant,
            retry: config.retry.policy(),
            queue_depth: config.dispatcher.queue_depth.max(1),
            idle_timeout: config.dispatcher.idle_timeout(),
            workers: Arc::new(DashMap::new()),
            states: Arc::new(DashMap::new()),
            locator: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Submits a port create or update.
    ///
    /// The port's network is looked up in the tenant store the first time
    /// the port is seen.
    pub async fn on_port_changed(
        &self,
        port_id: &str,
        changed_fields: BTreeSet<PortField>,
    ) -> Result<Completion, DispatchError> {
        let network_id = match self.locate(port_id) {
            Some(network_id) => network_id,
            None => {
                let port = self
                    .retry
                    .run("get_port", || self.tenant.get_port(port_id))
                    .await?
                    .ok_or_else(|| DispatchError::UnknownPort(port_id.to_string()))?;
                self.locator
                    .insert(port_id.to_string(), port.network_id.clone());
                port.network_id
            }
        };

        self.submit(
            network_id,
            Event::PortChanged {
                port_id: port_id.to_string(),
                changed_fields,
            },
        )
        .await
    }

    /// Submits a port deletion.
    pub async fn on_port_deleted(&self, port_id: &str) -> Result<Completion, DispatchError> {
        let network_id = self
            .locate(port_id)
            .ok_or_else(|| DispatchError::UnknownPort(port_id.to_string()))?;
        self.submit(
            network_id,
            Event::PortDeleted {
                port_id: port_id.to_string(),
            },
        )
        .await
    }

    /// Submits a network attribute change.
    pub async fn on_network_changed(&self, network_id: &str) -> Result<Completion, DispatchError> {
        self.submit(
            network_id.to_string(),
            Event::NetworkChanged {
                network_id: network_id.to_string(),
            },
        )
        .await
    }

    /// Network a port was last routed to.
    pub fn locate(&self, port_id: &str) -> Option<NetworkId> {
        self.locator.get(port_id).map(|n| n.value().clone())
    }

    /// Number of live workers.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Number of networks whose state is held in memory.
    pub fn tracked_networks(&self) -> usize {
        self.states.len()
    }

    /// Stops accepting events and lets workers finish their queues.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.workers.clear();
        info!("Dispatcher shut down");
    }

    async fn submit(
        &self,
        network_id: NetworkId,
        event: Event,
    ) -> Result<Completion, DispatchError> {
        let (reply, rx) = oneshot::channel();
        let mut envelope = Envelope { event, reply };

        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return Err(DispatchError::ShuttingDown);
            }

            let (tx, generation) = self.worker_for(&network_id);
            match tx.send(envelope).await {
                Ok(()) => return Ok(Completion { network_id, rx }),
                Err(mpsc::error::SendError(returned)) => {
                    // The worker retired between lookup and send.
                    debug!(network = %network_id, generation, "Worker gone, respawning");
                    self.workers
                        .remove_if(&network_id, |_, h| h.generation == generation);
                    envelope = returned;
                }
            }
        }
    }

    fn worker_for(&self, network_id: &str) -> (mpsc::Sender<Envelope>, u64) {
        if let Some(handle) = self.workers.get(network_id) {
            return (handle.tx.clone(), handle.generation);
        }

        let handle = self
            .workers
            .entry(network_id.to_string())
            .or_insert_with(|| self.spawn_worker(network_id));
        (handle.tx.clone(), handle.generation)
    }

    fn spawn_worker(&self, network_id: &str) -> WorkerHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let state = self
            .states
            .entry(network_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(NetworkState::new(network_id))))
            .clone();
        let (tx, rx) = mpsc::channel(self.queue_depth);

        let worker = Worker {
            network_id: network_id.to_string(),
            generation,
            idle_timeout: self.idle_timeout,
            engine: self.engine.clone(),
            state,
            states: self.states.clone(),
            workers: self.workers.clone(),
            locator: self.locator.clone(),
        };
        tokio::spawn(worker.run(rx));

        debug!(network = network_id, generation, "Worker spawned");
        WorkerHandle { tx, generation }
    }
}
