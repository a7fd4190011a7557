//! PortOrchDaemon implementation.
//!
//! Owns the registered Orchs and drives their maintenance work on a timer
//! while the [`Dispatcher`] handles tenant events on its own workers.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::dispatch::Dispatcher;
use ovn_orch_common::Orch;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The reconciler daemon.
pub struct PortOrchDaemon {
    maintenance_interval: Duration,
    /// Registered Orchs sorted by priority
    orchs: BTreeMap<i32, Vec<Box<dyn Orch>>>,
    dispatcher: Arc<Dispatcher>,
}

impl PortOrchDaemon {
    pub fn new(maintenance_interval: Duration, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            maintenance_interval,
            orchs: BTreeMap::new(),
            dispatcher,
        }
    }

    /// Registers an Orch with the daemon.
    ///
    /// Orchs are ordered by priority (lower = higher priority).
    pub fn register_orch(&mut self, orch: Box<dyn Orch>) {
        let priority = orch.priority();
        let orch_name = orch.name().to_string();
        info!("Registering {} with priority {}", orch_name, priority);

        let record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "PortOrchDaemon",
            format!("register_orch: {}", orch_name),
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(&orch_name)
        .with_object_type("orch_module")
        .with_details(serde_json::json!({
            "priority": priority,
        }));
        audit_log!(record);

        self.orchs.entry(priority).or_default().push(orch);
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn orch_count(&self) -> usize {
        self.orchs.values().map(Vec::len).sum()
    }

    /// Runs startup work of every Orch once.
    ///
    /// Returns true if no Orch is left with pending work.
    pub async fn init(&mut self) -> bool {
        info!("Initializing PortOrchDaemon with {} orchs", self.orch_count());
        self.run_pending().await;

        let ready = self
            .orchs
            .values()
            .flatten()
            .all(|orch| !orch.has_pending_tasks());

        let record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "PortOrchDaemon",
            "daemon_initialization",
        )
        .with_outcome(if ready {
            AuditOutcome::Success
        } else {
            AuditOutcome::InProgress
        })
        .with_details(serde_json::json!({
            "orch_count": self.orch_count(),
        }));
        audit_log!(record);

        if !ready {
            for orch in self.orchs.values().flatten() {
                for task in orch.dump_pending_tasks() {
                    warn!("{} still pending: {}", orch.name(), task);
                }
            }
        }
        ready
    }

    /// Runs the maintenance loop until `shutdown` resolves.
    ///
    /// The dispatcher is shut down on exit; queued events still finish.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting PortOrchDaemon maintenance loop, interval {:?}",
            self.maintenance_interval
        );
        let record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "PortOrchDaemon",
            "event_loop_started",
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "maintenance_interval_secs": self.maintenance_interval.as_secs_f64(),
            "orch_count": self.orch_count(),
        }));
        audit_log!(record);

        let mut ticker = tokio::time::interval(self.maintenance_interval);
        // The first tick completes immediately.
        ticker.tick().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    for orch in self.orchs.values_mut().flatten() {
                        orch.on_timer();
                    }
                    self.run_pending().await;
                }
            }
        }

        self.dispatcher.shutdown();

        let stop_record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "PortOrchDaemon",
            "event_loop_stopped",
        )
        .with_outcome(AuditOutcome::Success);
        audit_log!(stop_record);
        info!("PortOrchDaemon maintenance loop stopped");
    }

    async fn run_pending(&mut self) {
        for orchs in self.orchs.values_mut() {
            for orch in orchs.iter_mut() {
                if orch.has_pending_tasks() {
                    debug!("Processing tasks for {}", orch.name());
                    orch.do_task().await;
                }
            }
        }
    }
}
