//! Per-network worker task.

use super::event::Event;
use crate::lsp::{LspEngine, NetworkState, Outcome, ReconcileReport};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ovn_types::{NetworkId, PortId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, trace};

/// One queued event and the channel its report goes back on.
pub(super) struct Envelope {
    pub event: Event,
    pub reply: oneshot::Sender<ReconcileReport>,
}

/// Dispatcher-side handle of a running worker.
pub(super) struct WorkerHandle {
    pub tx: mpsc::Sender<Envelope>,
    pub generation: u64,
}

pub(super) struct Worker {
    pub network_id: NetworkId,
    pub generation: u64,
    pub idle_timeout: Duration,
    pub engine: Arc<LspEngine>,
    pub state: Arc<Mutex<NetworkState>>,
    pub states: Arc<DashMap<NetworkId, Arc<Mutex<NetworkState>>>>,
    pub workers: Arc<DashMap<NetworkId, WorkerHandle>>,
    pub locator: Arc<DashMap<PortId, NetworkId>>,
}

impl Worker {
    /// Processes events in arrival order until idle or disconnected.
    ///
    /// On idle the worker unregisters itself, then drains whatever was
    /// queued while still holding the network state, so a successor worker
    /// only starts after every earlier event finished. The state is evicted
    /// unless a successor already picked it up.
    pub async fn run(self, mut rx: mpsc::Receiver<Envelope>) {
        debug!(network = %self.network_id, generation = self.generation, "Worker started");

        loop {
            match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(envelope)) => {
                    let mut state = self.state.lock().await;
                    self.process(&mut state, envelope).await;
                }
                Ok(None) => break,
                Err(_) => {
                    let mut state = self.state.lock().await;
                    let generation = self.generation;
                    self.workers
                        .remove_if(&self.network_id, |_, h| h.generation == generation);
                    rx.close();
                    while let Some(envelope) = rx.recv().await {
                        self.process(&mut state, envelope).await;
                    }
                    self.evict_state();
                    break;
                }
            }
        }

        debug!(network = %self.network_id, generation = self.generation, "Worker retired");
    }

    fn evict_state(&self) {
        // No successor can spawn while the vacant slot is held.
        if let Entry::Vacant(_slot) = self.workers.entry(self.network_id.clone()) {
            let evicted = self
                .states
                .remove_if(&self.network_id, |_, s| Arc::ptr_eq(s, &self.state))
                .is_some();
            if evicted {
                debug!(network = %self.network_id, "Network state evicted");
            }
        }
    }

    async fn process(&self, state: &mut NetworkState, envelope: Envelope) {
        let was_primed = state.is_primed();
        let report = self.engine.handle(state, &envelope.event).await;

        if !was_primed {
            for port_id in state.port_ids() {
                self.locator
                    .insert(port_id.clone(), self.network_id.clone());
            }
        }
        match &envelope.event {
            Event::PortChanged { port_id, .. } if state.port(port_id).is_some() => {
                self.locator
                    .insert(port_id.clone(), self.network_id.clone());
            }
            Event::PortChanged { port_id, .. } => {
                self.locator.remove(port_id);
            }
            // A failed delete stays routable so it can be retried.
            Event::PortDeleted { port_id } => {
                if report.port_outcome(port_id) == Some(&Outcome::Deleted) {
                    self.locator.remove(port_id);
                }
            }
            Event::NetworkChanged { .. } => {}
        }

        if envelope.reply.send(report).is_err() {
            trace!(network = %self.network_id, "Completion dropped before report");
        }
    }
}
